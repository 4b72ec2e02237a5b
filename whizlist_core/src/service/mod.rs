//! SeaORM-backed services, each also served over RPC.

pub mod comments;
pub mod folders;
pub mod lists;
pub mod products;
pub mod profiles;
