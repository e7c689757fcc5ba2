mod apply;
mod create;
mod get;
mod master;
mod worker;

pub use apply::run_apply;
pub use create::run_create;
pub use get::run_get;
pub use master::run_master;
pub use worker::run_worker;
