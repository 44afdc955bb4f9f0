//! Domain model of the document engine
//!
//! Cells, tags, run contexts, output files and the branching document
//! history. Nothing in here touches the filesystem.

pub mod cell;
pub mod context;
pub mod document;
pub mod file;
pub mod location;
pub mod phase;
pub mod render;
pub mod tags;

pub use cell::{Block, Cell, CellError, CellKind, CellsStream, Fenced, Line};
pub use context::{Attrs, RunContext, ValueMap, Vars, SPEC_VERSION};
pub use document::{Document, DocumentError, Episode, EpisodeRef, NamedEpisode, Story, DEFAULT_BRANCH};
pub use file::{File, FileError, FileSpec, FileSpecs, Files, GeneratedLine, Renderer, Subsection};
pub use location::{LocPart, Location};
pub use phase::Phase;
pub use render::{RenderError, RenderedLine};
pub use tags::{TagDef, TagDefs, TagError, TagInstance, TagsInstances};
