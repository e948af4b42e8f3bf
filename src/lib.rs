//! Bootgraph core library: boot log tokenizing, interval pairing, call graph
//! matching and timeline output shared by the CLI.

mod callgraph;
mod cmd;
mod config;
mod envinfo;
mod error;
mod fsutil;
mod logsource;
mod matcher;
mod normalize;
mod pairer;
mod pending;
mod render;
mod timeline;
mod tokenize;

pub use callgraph::*;
pub use cmd::*;
pub use config::*;
pub use envinfo::*;
pub use error::*;
pub use fsutil::*;
pub use logsource::*;
pub use matcher::*;
pub use normalize::*;
pub use pairer::*;
pub use pending::*;
pub use render::*;
pub use timeline::*;
pub use tokenize::*;
