//! Migration maker.
//!
//! Ties the pipeline together: loads the last recorded state, plans the
//! migration to the current snapshot, writes the artifact and records the
//! new state.

use std::path::PathBuf;

use chrono::Utc;
use tracing::{debug, error, info};

use crate::error::{PlanError, Result};
use crate::naming::ColumnNamePolicy;
use crate::snapshot::Tables;
use crate::state::{transition, MigrationState, Transition};
use crate::store::StateStore;
use crate::writer::{generate_migration_name, MigrationArtifact, MigrationWriter};

/// Options for [`MigrationMaker::make`].
#[derive(Debug, Clone, Default)]
pub struct MigrationOptions {
    /// Directory migration files are written to. Required unless previewing.
    pub out_dir: Option<PathBuf>,
    /// Plan and print without writing or recording anything.
    pub preview: bool,
    /// Migration name, sanitized into the file name.
    pub migration_name: Option<String>,
    /// Free-form comment stored in the artifact.
    pub comment: Option<String>,
    /// Log store failures with full detail.
    pub debug: bool,
    /// Column naming policy applied to the current snapshot.
    pub column_policy: ColumnNamePolicy,
}

impl MigrationOptions {
    /// Creates options writing into `out_dir`.
    #[must_use]
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: Some(out_dir.into()),
            ..Self::default()
        }
    }

    /// Creates preview-only options.
    #[must_use]
    pub fn preview() -> Self {
        Self {
            preview: true,
            ..Self::default()
        }
    }

    /// Sets the migration name.
    #[must_use]
    pub fn migration_name(mut self, name: impl Into<String>) -> Self {
        self.migration_name = Some(name.into());
        self
    }

    /// Sets the comment.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Enables debug logging of store failures.
    #[must_use]
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Sets the column naming policy.
    #[must_use]
    pub fn column_policy(mut self, policy: ColumnNamePolicy) -> Self {
        self.column_policy = policy;
        self
    }

    /// Checks the options before any work is done.
    pub fn validate(&self) -> Result<()> {
        if self.preview {
            return Ok(());
        }
        match self.out_dir {
            None => Err(PlanError::MissingOutDir),
            Some(ref dir) if !dir.is_dir() => Err(PlanError::OutDirNotFound(dir.clone())),
            Some(_) => Ok(()),
        }
    }
}

/// Result of a successful [`MigrationMaker::make`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MakeOutcome {
    /// The current snapshot matches the recorded state.
    NoChangesFound,
    /// Preview mode: the plan was printed, nothing was written.
    SuccessWithoutSave,
    /// The artifact was written and the new state recorded.
    Success {
        /// Artifact path.
        path: PathBuf,
    },
    /// The artifact was written but recording the new state failed.
    SuccessAnyway {
        /// Artifact path.
        path: PathBuf,
    },
}

/// Produces migration artifacts from snapshots.
pub struct MigrationMaker<S: StateStore> {
    store: S,
}

impl<S: StateStore> MigrationMaker<S> {
    /// Creates a maker on top of `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the state store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Plans and writes the migration taking the recorded state to `current`.
    pub async fn make(&self, current: &Tables, options: &MigrationOptions) -> Result<MakeOutcome> {
        options.validate()?;

        let previous = self
            .store
            .last_state()
            .await?
            .unwrap_or_else(MigrationState::initial);
        debug!(revision = previous.revision, "Loaded previous state");

        let current: Tables = current
            .iter()
            .map(|(name, table)| (name.clone(), table.with_column_policy(options.column_policy)))
            .collect();

        let (next_state, plan) = match transition(&previous, current)? {
            Transition::NoChangesFound => {
                info!("No changes found");
                return Ok(MakeOutcome::NoChangesFound);
            }
            Transition::Changed { next_state, plan } => (next_state, plan),
        };

        for line in &plan.console_out {
            info!("[Actions] {}", line);
        }

        if options.preview {
            info!("Preview mode - migration will be printed but not saved.");
            for line in plan.preview_lines() {
                println!("{}", line);
            }
            return Ok(MakeOutcome::SuccessWithoutSave);
        }

        let Some(ref out_dir) = options.out_dir else {
            return Err(PlanError::MissingOutDir);
        };

        let name = generate_migration_name(next_state.revision, options.migration_name.as_deref());
        let artifact = MigrationArtifact {
            revision: next_state.revision,
            name: name.clone(),
            comment: options.comment.clone(),
            created_at: Utc::now(),
            up: plan.commands_up,
            down: plan.commands_down,
        };
        let path = MigrationWriter::new(out_dir).write(&artifact)?;
        info!(
            revision = next_state.revision,
            path = %path.display(),
            "Migration written"
        );

        match self
            .store
            .upsert(next_state.revision, &name, &next_state)
            .await
        {
            Ok(()) => Ok(MakeOutcome::Success { path }),
            Err(e) => {
                if options.debug {
                    error!(error = ?e, revision = next_state.revision, "Failed to record migration state");
                } else {
                    error!(error = %e, "Migration written but its state was not recorded");
                }
                Ok(MakeOutcome::SuccessAnyway { path })
            }
        }
    }
}
