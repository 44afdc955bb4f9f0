//! Document history
//!
//! Processing a cell appends an [`Episode`] to a branch ("story"). A branch
//! other than the default one forks from a parent episode and sees that
//! episode's output context until it has episodes of its own.
//!
//! ```text
//! main:  e0 ── e1 ── e2
//!               └── alt: e0 ── e1
//! ```
//!
//! All history collections are persistent, so cloning a [`Document`] is cheap
//! and the clone's history evolves independently. The source stream and the
//! frontmatter are shared.

use im::{OrdMap, Vector};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use super::cell::{is_internal_name, Cell, CellsStream};
use super::context::RunContext;
use super::location::Location;
use super::tags::TagDefs;

/// Name of the implicit default branch
pub const DEFAULT_BRANCH: &str = "main";

#[derive(Debug, Error, PartialEq)]
pub enum DocumentError {
    #[error("Branch '{0}' does not exist")]
    UnknownBranch(String),

    #[error("Parent {parent} of branch '{branch}' does not exist")]
    UnresolvedParent { branch: String, parent: String },

    #[error("Branch '{0}' needs a parent episode")]
    ParentRequired(String),

    #[error("Episode {0} has no processed cell")]
    Unprocessed(String),
}

/// One history step
#[derive(Debug, Clone)]
pub struct Episode {
    /// Context the cell started from
    pub context: RunContext,
    pub location: Location,
    pub cell: Arc<Cell>,
}

impl Episode {
    pub fn new(context: RunContext, cell: Arc<Cell>) -> Self {
        Self {
            context,
            location: cell.location().clone(),
            cell,
        }
    }
}

/// Position of an episode in the history
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EpisodeRef {
    pub branch: String,
    pub index: usize,
}

impl EpisodeRef {
    pub fn new(branch: impl Into<String>, index: usize) -> Self {
        Self {
            branch: branch.into(),
            index,
        }
    }
}

impl std::fmt::Display for EpisodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.branch, self.index)
    }
}

/// Ordered episodes of one branch
#[derive(Debug, Clone, Default)]
pub struct EpisodeArc(Vector<Arc<Episode>>);

impl EpisodeArc {
    pub fn get(&self, index: usize) -> Option<&Arc<Episode>> {
        self.0.get(index)
    }

    pub fn last(&self) -> Option<&Arc<Episode>> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Episode>> {
        self.0.iter()
    }

    fn push(&mut self, episode: Episode) -> usize {
        self.0.push_back(Arc::new(episode));
        self.0.len() - 1
    }
}

/// A branch: its episodes and the episode it forked from
#[derive(Debug, Clone, Default)]
pub struct Story {
    pub arc: EpisodeArc,
    pub parent: Option<EpisodeRef>,
}

/// Episode found by cell name
#[derive(Debug, Clone)]
pub struct NamedEpisode {
    pub branch: String,
    pub index: usize,
    pub episode: Arc<Episode>,
}

impl NamedEpisode {
    pub fn reference(&self) -> EpisodeRef {
        EpisodeRef::new(self.branch.clone(), self.index)
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    source: Arc<CellsStream>,
    frontmatter: Option<Arc<Cell>>,
    root_context: RunContext,
    stories: OrdMap<String, Story>,
    default_branch: String,
    tag_defs: Option<Arc<TagDefs>>,
}

impl Document {
    pub fn new(source: CellsStream, frontmatter: Option<Cell>) -> Self {
        Self {
            source: Arc::new(source),
            frontmatter: frontmatter.map(Arc::new),
            root_context: RunContext::default(),
            stories: OrdMap::new(),
            default_branch: DEFAULT_BRANCH.to_string(),
            tag_defs: None,
        }
    }

    pub fn with_default_branch(mut self, name: impl Into<String>) -> Self {
        self.default_branch = name.into();
        self
    }

    pub fn source(&self) -> &CellsStream {
        &self.source
    }

    pub fn frontmatter(&self) -> Option<&Cell> {
        self.frontmatter.as_deref()
    }

    pub fn root_context(&self) -> &RunContext {
        &self.root_context
    }

    pub fn root_context_mut(&mut self) -> &mut RunContext {
        &mut self.root_context
    }

    pub fn default_branch(&self) -> &str {
        &self.default_branch
    }

    /// Effective tag table, set when the document is initialized
    pub fn tag_defs(&self) -> Option<&Arc<TagDefs>> {
        self.tag_defs.as_ref()
    }

    pub fn set_tag_defs(&mut self, defs: Arc<TagDefs>) {
        self.tag_defs = Some(defs);
    }

    pub fn story(&self, name: &str) -> Option<&Story> {
        self.stories.get(name)
    }

    pub fn branch_names(&self) -> Vec<String> {
        self.stories.keys().cloned().collect()
    }

    pub fn stories(&self) -> impl Iterator<Item = (&String, &Story)> {
        self.stories.iter()
    }

    /// Total number of episodes over all branches
    pub fn episode_count(&self) -> usize {
        self.stories.values().map(|s| s.arc.len()).sum()
    }

    /// Creates a branch unless it exists; an existing branch is returned as is
    ///
    /// Branches other than the default one need a parent that resolves.
    pub fn ensure_branch(
        &mut self,
        name: &str,
        parent: Option<EpisodeRef>,
    ) -> Result<&Story, DocumentError> {
        if !self.stories.contains_key(name) {
            let parent = if name == self.default_branch {
                None
            } else {
                let parent = parent.ok_or_else(|| DocumentError::ParentRequired(name.to_string()))?;
                if self.resolve(&parent).is_none() {
                    return Err(DocumentError::UnresolvedParent {
                        branch: name.to_string(),
                        parent: parent.to_string(),
                    });
                }
                Some(parent)
            };
            self.stories.insert(
                name.to_string(),
                Story {
                    arc: EpisodeArc::default(),
                    parent,
                },
            );
        }
        self.stories
            .get(name)
            .ok_or_else(|| DocumentError::UnknownBranch(name.to_string()))
    }

    /// Latest episode a new cell on `name` would inherit from
    ///
    /// `None` for an empty branch without parent. A missing branch is an
    /// error unless it is the default branch or `not_found_ok` is set.
    pub fn last_episode_in_branch(
        &self,
        name: &str,
        not_found_ok: bool,
    ) -> Result<Option<EpisodeRef>, DocumentError> {
        match self.stories.get(name) {
            Some(story) if !story.arc.is_empty() => {
                Ok(Some(EpisodeRef::new(name, story.arc.len() - 1)))
            }
            Some(story) => Ok(story.parent.clone()),
            None if name == self.default_branch || not_found_ok => Ok(None),
            None => Err(DocumentError::UnknownBranch(name.to_string())),
        }
    }

    pub fn resolve(&self, reference: &EpisodeRef) -> Option<&Arc<Episode>> {
        self.stories
            .get(&reference.branch)
            .and_then(|s| s.arc.get(reference.index))
    }

    /// Output context of an episode's cell
    pub fn episode_output(&self, reference: &EpisodeRef) -> Result<RunContext, DocumentError> {
        let episode = self.resolve(reference).ok_or_else(|| DocumentError::UnresolvedParent {
            branch: reference.branch.clone(),
            parent: reference.to_string(),
        })?;
        episode
            .cell
            .output_context()
            .cloned()
            .ok_or_else(|| DocumentError::Unprocessed(reference.to_string()))
    }

    /// Context a new cell on `branch` starts from
    pub fn current_context(&self, branch: &str) -> Result<RunContext, DocumentError> {
        match self.last_episode_in_branch(branch, false)? {
            Some(reference) => self.episode_output(&reference),
            None => Ok(self.root_context.clone()),
        }
    }

    /// Appends an episode; the default branch is created on demand
    pub fn append(&mut self, branch: &str, episode: Episode) -> Result<EpisodeRef, DocumentError> {
        if branch == self.default_branch {
            self.ensure_branch(branch, None)?;
        }
        let story = self
            .stories
            .get_mut(branch)
            .ok_or_else(|| DocumentError::UnknownBranch(branch.to_string()))?;
        let index = story.arc.push(episode);
        Ok(EpisodeRef::new(branch, index))
    }

    /// Link to the episode before `reference`: the previous one in the same
    /// branch, or the branch's parent for a first episode
    pub fn episode_parent(&self, reference: &EpisodeRef) -> Option<EpisodeRef> {
        if reference.index > 0 {
            return Some(EpisodeRef::new(reference.branch.clone(), reference.index - 1));
        }
        self.stories
            .get(&reference.branch)
            .and_then(|s| s.parent.clone())
    }

    fn scan(&self) -> impl Iterator<Item = NamedEpisode> + '_ {
        self.stories.iter().flat_map(|(branch, story)| {
            story.arc.iter().enumerate().map(move |(index, episode)| NamedEpisode {
                branch: branch.clone(),
                index,
                episode: Arc::clone(episode),
            })
        })
    }

    pub fn lookup_episode_by_cell_name(&self, name: &str) -> Option<NamedEpisode> {
        self.scan().find(|e| e.episode.cell.name() == name)
    }

    /// Episodes whose cells carry an explicit (non-internal) name
    pub fn named_episodes(&self) -> Vec<NamedEpisode> {
        self.scan()
            .filter(|e| !is_internal_name(&e.episode.cell.name()))
            .collect()
    }
}
