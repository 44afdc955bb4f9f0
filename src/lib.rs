//! vdf - a literate-programming document engine for HDL sources
//!
//! A source mixes documentation with fenced code blocks that carry inline
//! directives ("tags"). The engine splits it into cells, applies each cell's
//! tags phase by phase and accumulates the results into output files whose
//! every line keeps a provenance trail back to its source line.

pub mod cli;
pub mod domain;
pub mod processor;
pub mod runner;
pub mod source;
pub mod storage;

pub use domain::{Cell, CellKind, Document, File, Location, RunContext};
pub use processor::{CellInput, ProcessError, Processor, Stage};
pub use storage::{Catalog, Config};
