#![allow(dead_code)]

use rusqlite::Connection;
use schemasync_core::log_sink::describe_cause;
use schemasync_core::{
    ConnectionError, Connector, CriticalError, EntityDescriptor, LogCode, LogSink, SyncContext,
    SyncError, SyncOptions,
};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::error::Error;
use std::path::PathBuf;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
    Critical,
}

#[derive(Debug, Clone)]
pub struct Record {
    pub level: Level,
    pub component: String,
    pub message: String,
    pub cause: Option<String>,
}

/// Sink that keeps every record for assertions.
#[derive(Clone, Default)]
pub struct RecordingSink {
    records: Rc<RefCell<Vec<Record>>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<Record> {
        self.records.borrow().clone()
    }

    pub fn messages(&self, level: Level) -> Vec<String> {
        self.records
            .borrow()
            .iter()
            .filter(|record| record.level == level)
            .map(|record| record.message.clone())
            .collect()
    }

    pub fn contains(&self, level: Level, message: &str) -> bool {
        self.messages(level).iter().any(|m| m.contains(message))
    }

    fn push(&self, level: Level, component: &str, message: &str, cause: Option<&dyn Error>) {
        self.records.borrow_mut().push(Record {
            level,
            component: component.to_string(),
            message: message.to_string(),
            cause: cause.map(describe_cause),
        });
    }
}

impl LogSink for RecordingSink {
    fn info(&self, component: &str, _code: LogCode, message: &str, cause: Option<&dyn Error>) {
        self.push(Level::Info, component, message, cause);
    }

    fn warn(&self, component: &str, _code: LogCode, message: &str, cause: Option<&dyn Error>) {
        self.push(Level::Warn, component, message, cause);
    }

    fn error(&self, component: &str, _code: LogCode, message: &str, cause: Option<&dyn Error>) {
        self.push(Level::Error, component, message, cause);
    }

    fn critical(
        &self,
        component: &str,
        code: LogCode,
        message: &str,
        cause: Option<&dyn Error>,
    ) -> CriticalError {
        self.push(Level::Critical, component, message, cause);
        CriticalError {
            component: component.to_string(),
            code,
            message: message.to_string(),
            cause: cause.map(describe_cause),
        }
    }
}

/// Ordered log of everything the doubles observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect,
    Sync {
        entity: String,
        options: SyncOptions,
        table_present: bool,
    },
}

pub type Journal = Rc<RefCell<Vec<Event>>>;

pub fn journal() -> Journal {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn synced_entities(journal: &Journal) -> Vec<String> {
    journal
        .borrow()
        .iter()
        .filter_map(|event| match event {
            Event::Sync { entity, .. } => Some(entity.clone()),
            Event::Connect => None,
        })
        .collect()
}

pub fn sync_options_for(journal: &Journal, name: &str) -> Vec<SyncOptions> {
    journal
        .borrow()
        .iter()
        .filter_map(|event| match event {
            Event::Sync {
                entity, options, ..
            } if entity == name => Some(*options),
            _ => None,
        })
        .collect()
}

/// Entity whose `sync` results are scripted; runs out into success.
pub struct ScriptedEntity {
    name: String,
    table: String,
    script: RefCell<VecDeque<bool>>,
    journal: Journal,
}

impl ScriptedEntity {
    pub fn ok(name: &str, journal: &Journal) -> Box<dyn EntityDescriptor> {
        Self::scripted(name, &[], journal)
    }

    /// Always-succeeding entity stored under `table` instead of its name.
    pub fn with_table(name: &str, table: &str, journal: &Journal) -> Box<dyn EntityDescriptor> {
        Box::new(Self {
            name: name.to_string(),
            table: table.to_string(),
            script: RefCell::new(VecDeque::new()),
            journal: Rc::clone(journal),
        })
    }

    /// `outcomes[i]` is the result of the i-th sync call (`true` = success).
    pub fn scripted(
        name: &str,
        outcomes: &[bool],
        journal: &Journal,
    ) -> Box<dyn EntityDescriptor> {
        Box::new(Self {
            name: name.to_string(),
            table: name.to_string(),
            script: RefCell::new(outcomes.iter().copied().collect()),
            journal: Rc::clone(journal),
        })
    }
}

impl EntityDescriptor for ScriptedEntity {
    fn name(&self) -> &str {
        &self.name
    }

    fn table_name(&self) -> &str {
        &self.table
    }

    fn sync(&self, ctx: &SyncContext<'_>) -> Result<(), SyncError> {
        let table_present: bool = ctx
            .conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
                [self.table.as_str()],
                |row| row.get(0),
            )
            .map_err(SyncError::from)?;
        self.journal.borrow_mut().push(Event::Sync {
            entity: self.name.clone(),
            options: ctx.options,
            table_present,
        });
        match self.script.borrow_mut().pop_front() {
            Some(false) => Err(SyncError::Other(format!("{} conflict", self.name))),
            _ => Ok(()),
        }
    }
}

/// Connector whose results are scripted; runs out into success.
pub struct ScriptedConnector {
    script: VecDeque<Result<(), ConnectionError>>,
    path: Option<PathBuf>,
    journal: Journal,
}

impl ScriptedConnector {
    pub fn new(
        script: Vec<Result<(), ConnectionError>>,
        path: Option<PathBuf>,
        journal: &Journal,
    ) -> Self {
        Self {
            script: script.into(),
            path,
            journal: Rc::clone(journal),
        }
    }
}

impl Connector for ScriptedConnector {
    fn connect(
        &mut self,
        _logger: &dyn LogSink,
        _verbose: bool,
    ) -> Result<Connection, ConnectionError> {
        self.journal.borrow_mut().push(Event::Connect);
        if let Some(Err(err)) = self.script.pop_front() {
            return Err(err);
        }
        let conn = match &self.path {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };
        Ok(conn)
    }
}
