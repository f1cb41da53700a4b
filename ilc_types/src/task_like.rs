//! Task-like type recognition.
//!
//! Only the four core library types qualify, matched by module, namespace
//! and exact name. Derived types and look-alikes in other modules do not.

use crate::module::ModuleId;
use crate::types::TypeHandle;

/// Namespace of the task-like types.
pub const TASKS_NAMESPACE: &str = "System.Threading.Tasks";

/// One of the recognized task-like families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskLikeKind {
    /// `System.Threading.Tasks.Task`
    Task,
    /// ``System.Threading.Tasks.Task`1``
    TaskOfT,
    /// `System.Threading.Tasks.ValueTask`
    ValueTask,
    /// ``System.Threading.Tasks.ValueTask`1``
    ValueTaskOfT,
}

impl TaskLikeKind {
    /// Classify a type, looking through instantiations to the definition.
    pub fn of(ty: &TypeHandle) -> Option<Self> {
        let definition = ty.type_definition();
        let md = definition.as_metadata()?;
        if md.module != ModuleId::SYSTEM || &*md.namespace != TASKS_NAMESPACE {
            return None;
        }
        match &*md.name {
            "Task" => Some(TaskLikeKind::Task),
            "Task`1" => Some(TaskLikeKind::TaskOfT),
            "ValueTask" => Some(TaskLikeKind::ValueTask),
            "ValueTask`1" => Some(TaskLikeKind::ValueTaskOfT),
            _ => None,
        }
    }

    /// Whether this is the value-type flavor.
    #[inline]
    pub const fn is_value_task(self) -> bool {
        matches!(self, TaskLikeKind::ValueTask | TaskLikeKind::ValueTaskOfT)
    }

    /// Whether the task carries a result.
    #[inline]
    pub const fn has_result(self) -> bool {
        matches!(self, TaskLikeKind::TaskOfT | TaskLikeKind::ValueTaskOfT)
    }

    /// Metadata name of the non-generic family type.
    #[inline]
    pub const fn family_name(self) -> &'static str {
        if self.is_value_task() { "ValueTask" } else { "Task" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{TypeDefinition, TypeSystemContext};
    use crate::corelib::install_async_library;
    use crate::signature::Instantiation;
    use crate::types::WellKnownType;

    #[test]
    fn test_classifies_core_task_types() {
        let ctx = TypeSystemContext::default();
        let lib = install_async_library(&ctx);
        let int32 = ctx.get_well_known_type(WellKnownType::Int32);
        let value_task_of_int =
            ctx.get_instantiated_type(&lib.value_task_of_t, Instantiation::from_slice(&[int32]));

        assert_eq!(TaskLikeKind::of(&lib.task), Some(TaskLikeKind::Task));
        assert_eq!(TaskLikeKind::of(&value_task_of_int), Some(TaskLikeKind::ValueTaskOfT));
        assert!(TaskLikeKind::ValueTaskOfT.is_value_task());
        assert!(TaskLikeKind::ValueTaskOfT.has_result());
        assert!(!TaskLikeKind::Task.has_result());
    }

    #[test]
    fn test_rejects_look_alikes() {
        let ctx = TypeSystemContext::default();
        let app = ctx.define_module("App");
        let fake = ctx.define_type(TypeDefinition::new(app, TASKS_NAMESPACE, "Task"));
        let other_ns = ctx.define_type(TypeDefinition::new(ModuleId::SYSTEM, "System", "Task"));

        assert_eq!(TaskLikeKind::of(&fake), None);
        assert_eq!(TaskLikeKind::of(&other_ns), None);
        assert_eq!(TaskLikeKind::of(&ctx.get_well_known_type(WellKnownType::Object)), None);
    }
}
