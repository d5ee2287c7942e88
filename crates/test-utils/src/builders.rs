//! Ready-made graphs, contexts and warehouse fixtures.

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use etldag::dag::DependencyGraph;
use etldag::task::{
    DedupeKey, Expectation, LoadSpec, QualityCheck, QualityGate, RetryPolicy, RunContext,
    StageSource, StageSpec, Task, TaskKind, TaskServices,
};
use etldag::types::{InsertMode, PathResolution};
use etldag::warehouse::{Row, StaticCredentialProvider, Value};

use crate::fake_warehouse::FakeWarehouse;

pub const BEGIN: &str = "Begin_execution";
pub const STAGE_EVENTS: &str = "Stage_events";
pub const STAGE_SONGS: &str = "Stage_songs";
pub const LOAD_SONGPLAYS: &str = "Load_songplays_fact_table";
pub const LOAD_USERS: &str = "Load_user_dim_table";
pub const LOAD_SONGS: &str = "Load_song_dim_table";
pub const LOAD_ARTISTS: &str = "Load_artist_dim_table";
pub const LOAD_TIME: &str = "Load_time_dim_table";
pub const QUALITY: &str = "Run_data_quality_checks";
pub const END: &str = "Stop_execution";

pub const EVENTS_URI: &str = "s3://udacity-dend/log_data/2020/03";
pub const SONGS_URI: &str = "s3://udacity-dend/song_data";

pub const SONGPLAYS_SQL: &str = "SELECT md5(e.sessionid || e.start_time) playid, e.start_time, e.userid, s.song_id FROM staging_events e LEFT JOIN staging_songs s ON e.song = s.title";
pub const USERS_SQL: &str = "SELECT DISTINCT userid, firstname, lastname FROM staging_events WHERE page = 'NextSong'";
pub const SONGS_SQL: &str = "SELECT DISTINCT song_id, title FROM staging_songs";
pub const ARTISTS_SQL: &str = "SELECT DISTINCT artist_id, artist_name FROM staging_songs";
pub const TIME_SQL: &str = "SELECT start_time, extract(hour from start_time) FROM songplays";

pub const NULL_CHECKS: [(&str, &str); 5] = [
    ("songplays", "SELECT COUNT(*) FROM songplays WHERE playid IS NULL OR start_time IS NULL OR userid IS NULL"),
    ("users", "SELECT COUNT(*) FROM users WHERE userid IS NULL"),
    ("songs", "SELECT COUNT(*) FROM songs WHERE songid IS NULL"),
    ("artists", "SELECT COUNT(*) FROM artists WHERE artistid IS NULL"),
    ("time", "SELECT COUNT(*) FROM time WHERE start_time IS NULL"),
];

/// 2020-03-21T10:00:00Z.
pub fn run_context() -> RunContext {
    RunContext::new(Utc.with_ymd_and_hms(2020, 3, 21, 10, 0, 0).unwrap())
}

pub fn services(warehouse: Arc<FakeWarehouse>) -> TaskServices {
    TaskServices {
        warehouse,
        credentials: Arc::new(StaticCredentialProvider::new().with(
            "aws_credentials",
            "AKIATEST",
            "secret",
        )),
    }
}

pub fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

/// Markers wired `ids[0] -> ids[1] -> ...`.
pub fn chain(ids: &[&str], retry: RetryPolicy) -> DependencyGraph {
    let mut builder = DependencyGraph::builder();
    for (i, id) in ids.iter().enumerate() {
        let mut task = Task::marker(*id).with_retry(retry);
        if i > 0 {
            task = task.after(ids[i - 1]);
        }
        builder = builder.add_task(task);
    }
    builder.build().unwrap()
}

pub fn stage_task(id: &str, table: &str, key: &str, json_paths: &str) -> Task {
    let source = StageSource {
        bucket: "udacity-dend".to_string(),
        key_template: key.to_string(),
        path_resolution: PathResolution::parse(json_paths),
    };
    Task::new(
        id,
        TaskKind::Stage(StageSpec::new(table, "aws_credentials", source)),
    )
}

pub fn load_spec(table: &str, columns: &[&str], query: &str, dedupe: Option<DedupeKey>) -> LoadSpec {
    LoadSpec {
        table: table.to_string(),
        columns: columns.iter().map(|c| c.to_string()).collect(),
        source_query: query.to_string(),
        insert_mode: InsertMode::Append,
        dedupe,
    }
}

pub fn null_check_gate() -> QualityGate {
    let mut gate = QualityGate::default();
    for (table, query) in NULL_CHECKS {
        let mut check = QualityCheck::expecting(query, "== 0".parse::<Expectation>().unwrap());
        check.description = format!("no NULL keys in {table}");
        gate = gate.with_check(check);
    }
    gate
}

/// The hourly song-play pipeline: two stages, a fact, four dimensions, a
/// quality gate, with start/end markers.
pub fn sparkify_tasks(retry: RetryPolicy) -> Vec<Task> {
    let dims = [LOAD_USERS, LOAD_SONGS, LOAD_ARTISTS, LOAD_TIME];

    let mut quality = Task::new(QUALITY, TaskKind::QualityGate(null_check_gate()));
    for dim in dims {
        quality = quality.after(dim);
    }

    vec![
        Task::marker(BEGIN),
        stage_task(STAGE_EVENTS, "staging_events", "log_data/{year}/{month}", "log_json_path.json")
            .after(BEGIN)
            .with_retry(retry),
        stage_task(STAGE_SONGS, "staging_songs", "song_data", "auto")
            .after(BEGIN)
            .with_retry(retry),
        Task::new(
            LOAD_SONGPLAYS,
            TaskKind::LoadFact(load_spec(
                "songplays",
                &["playid", "start_time", "userid", "songid"],
                SONGPLAYS_SQL,
                Some(DedupeKey::same("playid")),
            )),
        )
        .after(STAGE_EVENTS)
        .after(STAGE_SONGS)
        .with_retry(retry),
        Task::new(
            LOAD_USERS,
            TaskKind::LoadDimension(load_spec(
                "users",
                &["userid", "first_name", "last_name"],
                USERS_SQL,
                Some(DedupeKey::same("userid")),
            )),
        )
        .after(LOAD_SONGPLAYS)
        .with_retry(retry),
        Task::new(
            LOAD_SONGS,
            TaskKind::LoadDimension(load_spec(
                "songs",
                &["songid", "title"],
                SONGS_SQL,
                Some(DedupeKey::mapped("song_id", "songid")),
            )),
        )
        .after(LOAD_SONGPLAYS)
        .with_retry(retry),
        Task::new(
            LOAD_ARTISTS,
            TaskKind::LoadDimension(load_spec(
                "artists",
                &["artistid", "name"],
                ARTISTS_SQL,
                Some(DedupeKey::mapped("artist_id", "artistid")),
            )),
        )
        .after(LOAD_SONGPLAYS)
        .with_retry(retry),
        Task::new(
            LOAD_TIME,
            TaskKind::LoadDimension(load_spec(
                "time",
                &["start_time", "hour"],
                TIME_SQL,
                Some(DedupeKey::same("start_time")),
            )),
        )
        .after(LOAD_SONGPLAYS)
        .with_retry(retry),
        quality,
        Task::marker(END).after(QUALITY),
    ]
}

pub fn sparkify_graph(retry: RetryPolicy) -> DependencyGraph {
    DependencyGraph::build(sparkify_tasks(retry), Vec::new()).unwrap()
}

/// A warehouse in which every task of [`sparkify_graph`] succeeds.
pub fn sparkify_warehouse() -> FakeWarehouse {
    let events: Vec<Row> = vec![
        vec![text("NextSong"), text("s1"), Value::Int(1583000000000)],
        vec![text("NextSong"), text("s2"), Value::Int(1583000001000)],
    ];
    let songs: Vec<Row> = vec![vec![text("SOAAA"), text("Song A"), text("ARX")]];

    let mut warehouse = FakeWarehouse::new()
        .with_table("staging_events", &["page", "song", "ts"])
        .with_table("staging_songs", &["song_id", "title", "artist_id"])
        .with_table("songplays", &["playid", "start_time", "userid", "songid"])
        .with_table("users", &["userid", "first_name", "last_name"])
        .with_table("songs", &["songid", "title"])
        .with_table("artists", &["artistid", "name"])
        .with_table("time", &["start_time", "hour"])
        .with_object(EVENTS_URI, events)
        .with_object(SONGS_URI, songs)
        .with_source(
            SONGPLAYS_SQL,
            &["playid", "start_time", "userid", "song_id"],
            vec![
                vec![text("p1"), text("2020-03-01 10:00"), Value::Int(7), text("SOAAA")],
                vec![text("p2"), text("2020-03-01 11:00"), Value::Int(8), Value::Null],
            ],
        )
        .with_source(
            USERS_SQL,
            &["userid", "firstname", "lastname"],
            vec![
                vec![Value::Int(7), text("Ada"), text("Lovelace")],
                vec![Value::Int(8), text("Alan"), text("Turing")],
            ],
        )
        .with_source(SONGS_SQL, &["song_id", "title"], vec![vec![text("SOAAA"), text("Song A")]])
        .with_source(
            ARTISTS_SQL,
            &["artist_id", "artist_name"],
            vec![vec![text("ARX"), text("Artist X")]],
        )
        .with_source(
            TIME_SQL,
            &["start_time", "hour"],
            vec![
                vec![text("2020-03-01 10:00"), Value::Int(10)],
                vec![text("2020-03-01 11:00"), Value::Int(11)],
            ],
        );

    for (_, query) in NULL_CHECKS {
        warehouse = warehouse.with_query_result(query, vec![vec![Value::Int(0)]]);
    }
    warehouse
}
