//! Umbra: an embeddable, single-node analytical database built around
//! per-query native code specialization. Every SELECT, UPDATE, or DELETE
//! is lowered to generated C source hard-encoding the table's record
//! layout, predicate, and projection; compiled to a shared object by an
//! external C compiler; dynamically loaded; and run against record pages
//! that are themselves compiled shared libraries.
//!
//! ```no_run
//! use umbra::config::EngineConfig;
//! use umbra::engine::{Database, Outcome};
//!
//! let db = Database::open(EngineConfig::new("./mydb"));
//! db.execute("CREATE TABLE users (uuid VARCHAR(36), name VARCHAR(64), age INT)").unwrap();
//! db.execute("INSERT INTO users (name, age) VALUES ('ann', 30)").unwrap();
//! if let Outcome::Rows(rows) = db.execute("SELECT * FROM users").unwrap() {
//!     println!("{} rows", rows.rows.len());
//! }
//! ```

pub mod ast;
pub mod catalog;
pub mod codegen;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod fingerprint;
pub mod kernel_cache;
pub mod lexer;
pub mod loader;
pub mod metadata;
pub mod mutation;
pub mod page_store;
pub mod pagegen;
pub mod parser;
pub mod schema;
pub mod semantic;
pub mod synth;
pub mod value;

pub use config::EngineConfig;
pub use engine::{Database, Outcome};
pub use error::{Error, Result};
