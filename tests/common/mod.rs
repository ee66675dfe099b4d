use rusqlite::{Connection, Result};
use table_gateway::{Field, MappingError, Record, Row, SqliteConfig};
use tempfile::NamedTempFile;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub id: Option<i64>,
    pub country: String,
    pub city: Option<String>,
    pub telcode: i64,
}

impl Place {
    pub fn new(country: &str, city: &str, telcode: i64) -> Self {
        Self {
            id: None,
            country: country.to_string(),
            city: Some(city.to_string()),
            telcode,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }
}

impl Record for Place {
    fn fields(&self) -> Vec<Field> {
        vec![
            Field::column("id", &self.id),
            Field::column("country", &self.country),
            Field::column("city", &self.city),
            Field::column("telcode", &self.telcode),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, MappingError> {
        Ok(Place {
            id: row.get("id")?,
            country: row.get("country")?,
            city: row.get("city")?,
            telcode: row.get("telcode")?,
        })
    }
}

// Send test logs through the test harness; RUST_LOG=table_gateway=trace shows the SQL.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// Helper function to create an in-memory database for testing
pub fn create_test_db() -> Result<Connection> {
    init_tracing();
    let conn = Connection::open_in_memory()?;
    initialize_schema(&conn)?;
    Ok(conn)
}

// Helper function to create a temporary file-based database
pub fn create_temp_db() -> Result<(Connection, NamedTempFile)> {
    init_tracing();
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_str().unwrap();
    let conn = SqliteConfig::new(path).open()?;
    initialize_schema(&conn)?;
    Ok((conn, temp_file))
}

// Initialize the database schema
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE places (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            country TEXT,
            city TEXT NULL,
            telcode INTEGER
        );
        CREATE TABLE events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            happened_at TEXT NOT NULL,
            done INTEGER NOT NULL,
            score REAL,
            payload BLOB
        );
        CREATE TABLE tags (
            code TEXT PRIMARY KEY,
            label TEXT NOT NULL
        );
        CREATE TABLE counters (
            id INTEGER PRIMARY KEY AUTOINCREMENT
        );
        "#,
    )
}

pub fn seed_places() -> Vec<Place> {
    vec![
        Place::new("Germany", "Stuttgart", 711),
        Place::new("Germany", "Munich", 89),
        Place::new("Germany", "Berlin", 40),
        Place::new("Italy", "Rome", 815),
    ]
}
