//! Git access for multimerge: the command gateway, working-tree handles, and
//! repository discovery.

pub mod discovery;
pub mod gateway;
pub mod repository;

pub use gateway::{CommandGateway, CommandResult, GitCli, GitCommand};
pub use repository::RepositoryHandle;
