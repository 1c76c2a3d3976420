mod common;

use common::{
    journal, sync_options_for, synced_entities, Event, Journal, Level, RecordingSink,
    ScriptedConnector, ScriptedEntity,
};
use rusqlite::Connection;
use schemasync_core::{
    BootstrapOptions, Bootstrapper, ConnectionError, EntityDescriptor, LogCode, Outcome,
    RelationshipGraph, RetryPolicy, SyncOptions,
};
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

const NAMES: [&str; 8] = [
    "Category", "Product", "Log", "User", "Point", "Donation", "Rank", "Address",
];

/// Eight entities; each `(position, [first pass, repair])` scripts one of them.
fn eight_entities(
    journal: &Journal,
    failures: &[(usize, [bool; 2])],
) -> Vec<Box<dyn EntityDescriptor>> {
    NAMES
        .iter()
        .enumerate()
        .map(|(index, name)| {
            match failures.iter().find(|(position, _)| *position == index) {
                Some((_, script)) => ScriptedEntity::scripted(name, &script[..], journal),
                None => ScriptedEntity::ok(name, journal),
            }
        })
        .collect()
}

fn bootstrapper(
    connector: ScriptedConnector,
    entities: Vec<Box<dyn EntityDescriptor>>,
    options: BootstrapOptions,
    sink: &RecordingSink,
) -> Bootstrapper<ScriptedConnector> {
    Bootstrapper::new(
        connector,
        entities,
        RelationshipGraph::new(),
        options,
        Box::new(sink.clone()),
    )
}

fn in_memory(journal: &Journal) -> ScriptedConnector {
    ScriptedConnector::new(Vec::new(), None, journal)
}

#[test]
fn scenario_a_all_entities_succeed() {
    let journal = journal();
    let sink = RecordingSink::default();
    let mut boot = bootstrapper(
        in_memory(&journal),
        eight_entities(&journal, &[]),
        BootstrapOptions::default(),
        &sink,
    );

    let report = boot.run();

    assert_eq!(report.outcome, Outcome::Success);
    let first = report.first_pass.as_ref().unwrap();
    assert_eq!((first.attempted, first.succeeded, first.failed), (8, 8, 0));
    assert!(report.repair_pass.is_none());
    assert_eq!(synced_entities(&journal), NAMES.to_vec());
    assert!(sink.contains(Level::Info, "Table verification finished successfully!"));
    assert!(!sink.contains(Level::Warn, "trying to fix the models"));
}

#[test]
fn scenario_b_failure_recovered_by_repair() {
    let journal = journal();
    let sink = RecordingSink::default();
    let mut boot = bootstrapper(
        in_memory(&journal),
        eight_entities(&journal, &[(2, [false, true])]),
        BootstrapOptions::default(),
        &sink,
    );

    let report = boot.run();

    assert_eq!(report.outcome, Outcome::Recovered);
    let first = report.first_pass.as_ref().unwrap();
    assert_eq!((first.attempted, first.succeeded, first.failed), (8, 7, 1));
    assert_eq!(first.failed_names(), vec!["Log"]);
    let repair = report.repair_pass.as_ref().unwrap();
    assert_eq!((repair.attempted, repair.succeeded, repair.failed), (1, 1, 0));
    assert!(report.unresolved().is_empty());
    assert!(sink.contains(Level::Info, "correction completed!"));
}

#[test]
fn scenario_c_failure_survives_repair() {
    let journal = journal();
    let sink = RecordingSink::default();
    let mut boot = bootstrapper(
        in_memory(&journal),
        eight_entities(&journal, &[(4, [false, false])]),
        BootstrapOptions::default(),
        &sink,
    );

    let report = boot.run();

    assert_eq!(report.outcome, Outcome::SuccessWithErrors);
    let first = report.first_pass.as_ref().unwrap();
    assert_eq!((first.attempted, first.succeeded, first.failed), (8, 7, 1));
    let repair = report.repair_pass.as_ref().unwrap();
    assert_eq!((repair.attempted, repair.succeeded, repair.failed), (1, 0, 1));
    assert_eq!(report.unresolved(), vec!["Point"]);
    assert_eq!(repair.failed_entities[0].position, 4);
    assert!(sink.contains(Level::Warn, "starting with unresolved schema errors in [Point]"));
    assert!(report.into_result().is_ok());
}

#[test]
fn scenario_d_fatal_connection_error_runs_no_pass() {
    let journal = journal();
    let sink = RecordingSink::default();
    let connector = ScriptedConnector::new(
        vec![Err(ConnectionError::fatal("access denied"))],
        None,
        &journal,
    );
    let mut boot = bootstrapper(
        connector,
        eight_entities(&journal, &[]),
        BootstrapOptions::default(),
        &sink,
    );

    let report = boot.run();

    assert_eq!(report.outcome, Outcome::Failed);
    assert_eq!(report.attempts, 1);
    assert!(report.first_pass.is_none());
    assert!(synced_entities(&journal).is_empty());
    assert_eq!(*journal.borrow(), vec![Event::Connect]);
    assert!(sink.contains(Level::Error, "Error when trying to connect to the database!"));

    let err = report.into_result().unwrap_err();
    assert_eq!(err.code, LogCode::ServiceUnavailable);
    assert!(err.cause.unwrap().contains("access denied"));
}

#[test]
fn first_pass_continues_past_every_failure_in_declared_order() {
    let journal = journal();
    let sink = RecordingSink::default();
    let mut boot = bootstrapper(
        in_memory(&journal),
        eight_entities(
            &journal,
            &[(0, [false, true]), (3, [false, true]), (7, [false, true])],
        ),
        BootstrapOptions::default(),
        &sink,
    );

    let report = boot.run();

    let first = report.first_pass.as_ref().unwrap();
    assert_eq!(first.attempted, 8);
    assert_eq!(first.failed_names(), vec!["Category", "User", "Address"]);

    let visited = synced_entities(&journal);
    assert_eq!(&visited[..8], &NAMES[..]);
    assert_eq!(&visited[8..], &["Category", "User", "Address"]);
    assert_eq!(report.outcome, Outcome::Recovered);
    assert!(sink.contains(Level::Error, "3 errors in the models were found!"));
}

#[test]
fn repair_uses_alter_without_recreate_regardless_of_first_pass_options() {
    let journal = journal();
    let sink = RecordingSink::default();
    let options = BootstrapOptions {
        force_recreate: true,
        allow_alter: false,
        verbose: true,
        ..BootstrapOptions::default()
    };
    let mut boot = bootstrapper(
        in_memory(&journal),
        eight_entities(&journal, &[(5, [false, true])]),
        options,
        &sink,
    );

    boot.run();

    assert_eq!(
        sync_options_for(&journal, "Donation"),
        vec![
            SyncOptions {
                force_recreate: true,
                allow_alter: false,
                verbose: true,
            },
            SyncOptions::repair(true),
        ]
    );
    assert_eq!(sync_options_for(&journal, "Rank").len(), 1);
}

#[test]
fn each_entity_is_synced_at_most_twice() {
    let journal = journal();
    let sink = RecordingSink::default();
    let mut boot = bootstrapper(
        in_memory(&journal),
        eight_entities(&journal, &[(1, [false, false]), (6, [false, false])]),
        BootstrapOptions::default(),
        &sink,
    );

    boot.run();

    for name in NAMES {
        assert!(sync_options_for(&journal, name).len() <= 2, "{name} synced too often");
    }
    assert_eq!(sync_options_for(&journal, "Product").len(), 2);
}

#[test]
fn drop_all_tables_runs_before_first_sync() {
    let dir = tempfile::tempdir().unwrap();
    let path: PathBuf = dir.path().join("drop.sqlite3");
    {
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE \"Category\" (id INTEGER PRIMARY KEY);
             CREATE TABLE \"Product\" (id INTEGER PRIMARY KEY);
             INSERT INTO \"Category\" (id) VALUES (1);",
        )
        .unwrap();
    }

    let journal = journal();
    let sink = RecordingSink::default();
    let entities = vec![
        ScriptedEntity::ok("Category", &journal),
        ScriptedEntity::ok("Product", &journal),
    ];
    let options = BootstrapOptions {
        drop_all_tables: true,
        ..BootstrapOptions::default()
    };
    let mut boot = bootstrapper(
        ScriptedConnector::new(Vec::new(), Some(path), &journal),
        entities,
        options,
        &sink,
    );

    let report = boot.run();

    assert_eq!(report.outcome, Outcome::Success);
    for event in journal.borrow().iter() {
        if let Event::Sync { table_present, entity, .. } = event {
            assert!(!table_present, "{entity} still existed when synced");
        }
    }
    assert!(sink.contains(Level::Warn, "drop all the table finished!"));
}

#[test]
fn failed_drop_is_logged_and_sync_still_runs() {
    let journal = journal();
    let sink = RecordingSink::default();
    let entities = vec![
        ScriptedEntity::ok("Category", &journal),
        ScriptedEntity::with_table("Product", "bad name", &journal),
    ];
    let options = BootstrapOptions {
        drop_all_tables: true,
        ..BootstrapOptions::default()
    };
    let mut boot = bootstrapper(in_memory(&journal), entities, options, &sink);

    let report = boot.run();

    assert_eq!(report.outcome, Outcome::Success);
    assert_eq!(synced_entities(&journal), vec!["Category", "Product"]);
    let drop_failure = sink
        .records()
        .into_iter()
        .find(|record| record.level == Level::Error && record.component == "Database")
        .expect("drop failure should be logged");
    assert_eq!(
        drop_failure.cause.as_deref(),
        Some("refusing to drop invalid table name `bad name`")
    );
    assert!(!sink.contains(Level::Warn, "drop all the table finished!"));
}

#[test]
fn tables_survive_when_drop_is_not_configured() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keep.sqlite3");
    Connection::open(&path)
        .unwrap()
        .execute_batch("CREATE TABLE \"Category\" (id INTEGER PRIMARY KEY);")
        .unwrap();

    let journal = journal();
    let sink = RecordingSink::default();
    let mut boot = bootstrapper(
        ScriptedConnector::new(Vec::new(), Some(path), &journal),
        vec![ScriptedEntity::ok("Category", &journal)],
        BootstrapOptions::default(),
        &sink,
    );

    boot.run();

    assert_eq!(
        journal.borrow().last(),
        Some(&Event::Sync {
            entity: "Category".to_string(),
            options: SyncOptions::default(),
            table_present: true,
        })
    );
}

#[test]
fn timeouts_restart_the_whole_attempt() {
    let journal = journal();
    let sink = RecordingSink::default();
    let connector = ScriptedConnector::new(
        vec![
            Err(ConnectionError::timeout("ETIMEDOUT")),
            Err(ConnectionError::timeout("ETIMEDOUT")),
        ],
        None,
        &journal,
    );
    let options = BootstrapOptions {
        drop_all_tables: true,
        ..BootstrapOptions::default()
    };
    let mut boot = bootstrapper(connector, eight_entities(&journal, &[]), options, &sink);

    let report = boot.run();

    assert_eq!(report.outcome, Outcome::Success);
    assert_eq!(report.attempts, 3);
    let events = journal.borrow();
    assert_eq!(&events[..3], &[Event::Connect, Event::Connect, Event::Connect]);
    assert_eq!(events.len(), 3 + NAMES.len());
    assert_eq!(
        sink.messages(Level::Warn)
            .iter()
            .filter(|m| m.as_str() == "trying to connect to the database again!")
            .count(),
        2
    );
}

#[test]
fn non_timeout_error_after_timeout_is_not_retried() {
    let journal = journal();
    let sink = RecordingSink::default();
    let connector = ScriptedConnector::new(
        vec![
            Err(ConnectionError::timeout("ETIMEDOUT")),
            Err(ConnectionError::fatal("bad credentials")),
        ],
        None,
        &journal,
    );
    let mut boot = bootstrapper(
        connector,
        eight_entities(&journal, &[]),
        BootstrapOptions::default(),
        &sink,
    );

    let report = boot.run();

    assert_eq!(report.outcome, Outcome::Failed);
    assert_eq!(report.attempts, 2);
    assert!(synced_entities(&journal).is_empty());
}

#[test]
fn bounded_retry_gives_up_after_max_attempts() {
    let journal = journal();
    let sink = RecordingSink::default();
    let connector = ScriptedConnector::new(
        (0..10)
            .map(|_| Err(ConnectionError::timeout("ETIMEDOUT")))
            .collect(),
        None,
        &journal,
    );
    let options = BootstrapOptions {
        retry: RetryPolicy::bounded(NonZeroU32::new(3).unwrap(), Duration::ZERO),
        ..BootstrapOptions::default()
    };
    let mut boot = bootstrapper(connector, eight_entities(&journal, &[]), options, &sink);

    let report = boot.run();

    assert_eq!(report.outcome, Outcome::Failed);
    assert_eq!(report.attempts, 3);
    assert_eq!(journal.borrow().len(), 3);
    assert_eq!(sink.messages(Level::Critical), vec!["schema bootstrap aborted"]);
}

#[test]
fn connection_survives_the_bootstrap() {
    let journal = journal();
    let sink = RecordingSink::default();
    let mut boot = bootstrapper(
        in_memory(&journal),
        eight_entities(&journal, &[]),
        BootstrapOptions::default(),
        &sink,
    );

    boot.run();

    let conn = boot.into_connection().expect("connection should be kept");
    let one: i64 = conn.query_row("SELECT 1;", [], |row| row.get(0)).unwrap();
    assert_eq!(one, 1);
}

#[test]
fn entity_failures_are_logged_with_cause() {
    let journal = journal();
    let sink = RecordingSink::default();
    let mut boot = bootstrapper(
        in_memory(&journal),
        eight_entities(&journal, &[(6, [false, true])]),
        BootstrapOptions::default(),
        &sink,
    );

    boot.run();

    let failure = sink
        .records()
        .into_iter()
        .find(|record| record.level == Level::Error && record.component == "Rank")
        .expect("failure should be logged under the entity name");
    assert_eq!(failure.cause.as_deref(), Some("Rank conflict"));
    assert!(sink.contains(
        Level::Info,
        "verification result => Success: 7 | Errors: 1 | Total: 8"
    ));
    assert!(sink.contains(
        Level::Info,
        "correction attempts => Success: 1 | Errors: 0 | Total: 1"
    ));
}
