pub mod init;
pub mod list_models;
pub mod questions;
pub mod run;
pub mod validate;
