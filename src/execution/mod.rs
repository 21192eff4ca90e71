//! Query execution: the canonical store, the resolvers and their shared result type

pub mod frame;
pub mod live;
pub mod local;
pub mod resolver;
pub mod result;
pub mod stats;
pub mod store;

pub use live::LiveResolver;
pub use local::LocalResolver;
pub use resolver::{resolve_metric_column, Resolver};
pub use result::{DataSource, QueryResult};
pub use store::LocalStore;
