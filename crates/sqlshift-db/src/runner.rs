use std::collections::BTreeSet;

use serde::Serialize;
use sqlshift_common::{Direction, Error, Result};
use tracing::{debug, error, info, warn};

use crate::database::Database;
use crate::dialect::{DialectPolicy, RunProfile, SkipReason};
use crate::ledger::{DEFAULT_TABLE, VersionLedger, VersionStatus, validate_table_name};
use crate::migrations::MigrationScript;
use crate::source::{MigrationSource, load_scripts};
use crate::splitter::{preview, split_statements};

const PREVIEW_CHARS: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Loading,
    Skipping,
    Applying,
    Completed,
    Failed,
}

/// One decision taken during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MigrationEvent {
    SkippedApplied {
        version: u64,
        name: String,
    },
    SkippedDialect {
        version: u64,
        name: String,
        reason: SkipReason,
    },
    SkippedProfile {
        version: u64,
        name: String,
        reason: SkipReason,
    },
    Applied {
        version: u64,
        name: String,
        direction: Direction,
        statements: usize,
    },
    Failed {
        version: u64,
        name: String,
        direction: Direction,
        statement: usize,
    },
}

/// Outcome of a successful `up` or `down`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub direction: Direction,
    /// Versions executed in this run, in execution order.
    pub applied: Vec<u64>,
    pub events: Vec<MigrationEvent>,
    pub state: RunState,
}

impl RunReport {
    fn new(direction: Direction) -> Self {
        Self {
            direction,
            applied: Vec::new(),
            events: Vec::new(),
            state: RunState::Idle,
        }
    }

    pub fn skipped(&self) -> usize {
        self.events
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    MigrationEvent::SkippedApplied { .. }
                        | MigrationEvent::SkippedDialect { .. }
                        | MigrationEvent::SkippedProfile { .. }
                )
            })
            .count()
    }
}

/// Drives scripts from a [`MigrationSource`] into a [`Database`].
///
/// The runner holds the connection exclusively for its lifetime. Build one
/// per run and drop it afterwards; it keeps no state between runs other than
/// what the ledger table records.
pub struct MigrationRunner<'a> {
    db: &'a mut dyn Database,
    source: &'a dyn MigrationSource,
    policy: DialectPolicy,
    ledger: VersionLedger,
    state: RunState,
}

impl<'a> MigrationRunner<'a> {
    pub fn new(db: &'a mut dyn Database, source: &'a dyn MigrationSource) -> Self {
        let dialect = db.dialect();
        Self {
            db,
            source,
            policy: DialectPolicy::new(dialect, RunProfile::Full),
            ledger: VersionLedger::new(DEFAULT_TABLE, dialect),
            state: RunState::Idle,
        }
    }

    pub fn with_profile(mut self, profile: RunProfile) -> Self {
        self.policy = DialectPolicy::new(self.policy.dialect(), profile);
        self
    }

    pub fn with_ledger_table(mut self, table: &str) -> Result<Self> {
        validate_table_name(table)?;
        self.ledger = VersionLedger::new(table, self.policy.dialect());
        Ok(self)
    }

    /// Apply every pending up script in ascending version order.
    pub fn up(&mut self) -> Result<RunReport> {
        let mut report = RunReport::new(Direction::Up);
        let outcome = self.run_up(&mut report);
        self.finish(outcome, report)
    }

    /// Roll back the `steps` most recently applied versions, newest first.
    pub fn down(&mut self, steps: usize) -> Result<RunReport> {
        let mut report = RunReport::new(Direction::Down);
        let outcome = self.run_down(steps, &mut report);
        self.finish(outcome, report)
    }

    /// Mark `version` as cleanly applied without executing anything.
    ///
    /// Meant for operators after a dirty version was repaired by hand.
    /// Forcing below the first script (or to 0) empties the ledger.
    pub fn force(&mut self, version: u64) -> Result<()> {
        let has_floor = version > 0
            && load_scripts(self.source, Direction::Up)?
                .iter()
                .any(|s| s.version <= version);

        self.ledger.ensure_table(self.db)?;
        if has_floor {
            self.ledger.force(self.db, version)?;
            warn!(version, "ledger forced to version");
        } else {
            self.ledger.clear(self.db)?;
            warn!(version, "ledger cleared, no script at or below forced version");
        }
        Ok(())
    }

    /// Highest recorded version and whether it is dirty. Read-only.
    pub fn version(&mut self) -> Result<VersionStatus> {
        self.ledger.current_version(self.db)
    }

    fn run_up(&mut self, report: &mut RunReport) -> Result<()> {
        self.transition(RunState::Loading);
        let scripts = load_scripts(self.source, Direction::Up)?;
        self.ledger.ensure_table(self.db)?;
        self.refuse_if_dirty()?;
        info!(
            scripts = scripts.len(),
            dialect = %self.policy.dialect(),
            "running up migrations"
        );

        for script in &scripts {
            if self.ledger.has(self.db, script.version)? {
                self.transition(RunState::Skipping);
                debug!(version = script.version, name = %script.name, "already applied, skipping");
                report.events.push(MigrationEvent::SkippedApplied {
                    version: script.version,
                    name: script.name.clone(),
                });
                continue;
            }

            if let Some(reason) = self.policy.skip_reason(script) {
                self.transition(RunState::Skipping);
                report.events.push(skip_event(script, reason));
                continue;
            }

            self.apply(script, report)?;
            self.ledger.record(self.db, script.version, false)?;
        }
        Ok(())
    }

    fn run_down(&mut self, steps: usize, report: &mut RunReport) -> Result<()> {
        self.transition(RunState::Loading);
        let up_scripts = load_scripts(self.source, Direction::Up)?;
        let scripts = load_scripts(self.source, Direction::Down)?;
        self.ledger.ensure_table(self.db)?;
        self.refuse_if_dirty()?;

        // Versions covered only by a forced baseline have no row of their own.
        let mut applied: BTreeSet<u64> =
            self.ledger.executed_desc(self.db)?.into_iter().collect();
        for script in up_scripts.iter().filter(|s| self.policy.applies(s)) {
            if self.ledger.has(self.db, script.version)? {
                applied.insert(script.version);
            }
        }
        let versions: Vec<u64> = applied.into_iter().rev().take(steps).collect();
        info!(
            steps,
            versions = ?versions,
            dialect = %self.policy.dialect(),
            "running down migrations"
        );

        // Resolve every script before touching the schema.
        let mut plan = Vec::with_capacity(versions.len());
        for version in versions {
            let script = scripts
                .iter()
                .find(|s| s.version == version && self.policy.applies(s))
                .ok_or(Error::MissingScript {
                    version,
                    direction: Direction::Down,
                })?;
            plan.push(script);
        }

        for script in plan {
            self.apply(script, report)?;
            let baseline = up_scripts
                .iter()
                .rev()
                .find(|s| s.version < script.version && self.policy.applies(s))
                .map(|s| s.version);
            self.ledger.revert(self.db, script.version, baseline)?;
        }
        Ok(())
    }

    /// Execute one script statement by statement. On failure the version is
    /// recorded dirty and nothing already executed is undone.
    fn apply(&mut self, script: &MigrationScript, report: &mut RunReport) -> Result<()> {
        self.transition(RunState::Applying);
        let statements = split_statements(&script.body);
        let total = statements.len();
        info!(
            version = script.version,
            name = %script.name,
            direction = %script.direction,
            statements = total,
            "applying migration"
        );

        for (i, statement) in statements.iter().enumerate() {
            if let Err(source) = self.db.execute_statement(statement) {
                let index = i + 1;
                report.events.push(MigrationEvent::Failed {
                    version: script.version,
                    name: script.name.clone(),
                    direction: script.direction,
                    statement: index,
                });
                let failure = Error::StatementExecution {
                    version: script.version,
                    index,
                    total,
                    preview: preview(statement, PREVIEW_CHARS),
                    source,
                };
                if let Err(ledger_err) = self.ledger.record(self.db, script.version, true) {
                    error!(
                        version = script.version,
                        statement = index,
                        total,
                        "{failure}; could not mark the version dirty: {ledger_err}"
                    );
                    return Err(Error::Ledger(format!(
                        "{failure}; marking it dirty also failed: {ledger_err}"
                    )));
                }
                return Err(failure);
            }
        }

        report.applied.push(script.version);
        report.events.push(MigrationEvent::Applied {
            version: script.version,
            name: script.name.clone(),
            direction: script.direction,
            statements: total,
        });
        Ok(())
    }

    fn refuse_if_dirty(&mut self) -> Result<()> {
        match self.ledger.first_dirty(self.db)? {
            Some(version) => Err(Error::Dirty(version)),
            None => Ok(()),
        }
    }

    fn finish(&mut self, outcome: Result<()>, mut report: RunReport) -> Result<RunReport> {
        match outcome {
            Ok(()) => {
                self.transition(RunState::Completed);
                report.state = RunState::Completed;
                info!(
                    direction = %report.direction,
                    applied = report.applied.len(),
                    skipped = report.skipped(),
                    "migrations completed"
                );
                Ok(report)
            }
            Err(e) => {
                self.transition(RunState::Failed);
                error!(direction = %report.direction, "migration run failed: {e}");
                Err(e)
            }
        }
    }

    fn transition(&mut self, next: RunState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "runner state");
            self.state = next;
        }
    }
}

fn skip_event(script: &MigrationScript, reason: SkipReason) -> MigrationEvent {
    match reason {
        SkipReason::Dialect { tagged, active } => {
            info!(
                version = script.version,
                name = %script.name,
                %tagged,
                %active,
                "skipping script for another dialect"
            );
            MigrationEvent::SkippedDialect {
                version: script.version,
                name: script.name.clone(),
                reason,
            }
        }
        SkipReason::Profile { category, profile } => {
            info!(
                version = script.version,
                name = %script.name,
                %category,
                profile = ?profile,
                "skipping script excluded by run profile"
            );
            MigrationEvent::SkippedProfile {
                version: script.version,
                name: script.name.clone(),
                reason,
            }
        }
    }
}
