pub mod operation;
pub mod postgres;
pub mod sql_value;
