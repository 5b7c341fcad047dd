pub mod group_type;
pub mod task_record;
pub mod task_state;
pub mod task_type;

pub use group_type::GroupType;
pub use task_record::TaskRecord;
pub use task_state::TaskState;
pub use task_type::TaskType;
