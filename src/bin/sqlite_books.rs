use colored::Colorize;
use std::error::Error;
use std::path::PathBuf;
use unique_handle::config::DemoConfig;
use unique_handle::{Connection, SqlError, Statement};

// =============================================================================
// Book table
// =============================================================================

/// Creates the `Book` table (dropping it first when configured) and writes
/// the configured books, replacing rows with the same id.
fn load_books(conn: &Connection, config: &DemoConfig) -> Result<(), SqlError> {
    if config.recreate_table {
        conn.execute("DROP TABLE IF EXISTS Book")?;
    }
    conn.execute(
        "CREATE TABLE IF NOT EXISTS Book (Id INT PRIMARY KEY, Title NVARCHAR(100) NOT NULL)",
    )?;

    let mut insert = conn.prepare("INSERT OR REPLACE INTO Book (Id, Title) VALUES (?, ?)")?;
    for book in &config.books {
        insert.bind_int64(1, book.id)?;
        insert.bind_text(2, &book.title)?;
        insert.step()?;
        insert.rewind();
    }
    Ok(())
}

/// All rows, highest id first.
fn all_books(conn: &Connection) -> Result<Vec<(i64, String)>, SqlError> {
    let mut s = conn.prepare("SELECT Id, Title FROM Book ORDER BY Id DESC")?;
    let mut rows = Vec::new();
    while s.step()? {
        rows.push((s.get_int64(0), s.get_string(1).unwrap_or_default()));
    }
    Ok(rows)
}

fn run(config: &DemoConfig) -> Result<(), Box<dyn Error>> {
    // Connection starts out disconnected.
    let mut conn = Connection::new();
    conn.open(&config.database)?;
    log::info!("connected to {}", config.database);

    load_books(&conn, config)?;

    let mut s = Statement::new();

    s.prepare(&conn, "SELECT Id FROM Book WHERE Title = 'B'")?;
    if s.step()? {
        println!("Id: {}", s.get_int(0));
    }

    s.prepare(&conn, "SELECT Title FROM Book WHERE Id = 3")?;
    if s.step()? {
        println!("Title: {}", s.get_string(0).unwrap_or_default());
    }

    println!("{}", "All books:".bold());
    for (id, title) in all_books(&conn)? {
        println!("  {id} {title}");
    }

    Ok(())
}

fn main() {
    let path = std::env::args().nth(1).map(PathBuf::from);

    let config = match DemoConfig::load(path.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err.to_string().red());
            std::process::exit(2);
        }
    };
    unique_handle::logging::init(&config.log_filter);

    if let Err(err) = run(&config) {
        eprintln!("{}", err.to_string().red());
        std::process::exit(1);
    }
}

// =============================================================================
// Tests
// =============================================================================
