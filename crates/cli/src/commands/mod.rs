pub mod config_cmd;
pub mod memory;
pub mod run;
pub mod tools;
