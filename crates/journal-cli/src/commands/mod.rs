pub mod copy;
pub mod delete;
pub mod query;
pub mod show;
pub mod values;
