//! CLI surface (spec section 6): `umbra --db <dir> [-e "<sql>"]
//! [--tolerate-page-loss]`. With `-e` the statement runs once and the
//! process exits with the code from `Error::exit_code()`; without it,
//! statements are read one per line from stdin until EOF.

use std::io::{self, BufRead, Write};

use umbra::config::EngineConfig;
use umbra::engine::{Database, Outcome};

fn main() {
    env_logger::init();

    let mut db_dir: Option<String> = None;
    let mut inline_sql: Option<String> = None;
    let mut tolerate_page_loss = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--db" => db_dir = args.next(),
            "-e" | "--execute" => inline_sql = args.next(),
            "--tolerate-page-loss" => tolerate_page_loss = true,
            other => {
                eprintln!("unrecognized argument: {other}");
                std::process::exit(2);
            }
        }
    }

    let Some(db_dir) = db_dir else {
        eprintln!("usage: umbra --db <dir> [-e \"<sql>\"] [--tolerate-page-loss]");
        std::process::exit(2);
    };

    let mut config = EngineConfig::new(db_dir);
    config.tolerate_page_loss = tolerate_page_loss;
    let db = Database::open(config);

    if let Some(sql) = inline_sql {
        let code = run_statement(&db, &sql);
        std::process::exit(code);
    }

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("read error: {e}");
                std::process::exit(2);
            }
        };
        let sql = line.trim();
        if sql.is_empty() {
            continue;
        }
        run_statement(&db, sql);
        let _ = io::stdout().flush();
    }
}

fn run_statement(db: &Database, sql: &str) -> i32 {
    match db.execute(sql) {
        Ok(Outcome::Rows(rows)) => {
            print_rows(&rows);
            0
        }
        Ok(Outcome::Mutation(m)) => {
            println!("rows affected: {}", m.rows_affected);
            0
        }
        Ok(Outcome::SchemaChanged) => {
            println!("OK");
            0
        }
        Err(e) => {
            eprintln!("error: {e}");
            e.exit_code()
        }
    }
}

fn print_rows(rows: &umbra::executor::ResultSet) {
    println!("{}", rows.columns.join("\t"));
    for row in &rows.rows {
        let rendered: Vec<String> = row.iter().map(format_value).collect();
        println!("{}", rendered.join("\t"));
    }
}

fn format_value(v: &umbra::value::Value) -> String {
    match v {
        umbra::value::Value::Int32(n) => n.to_string(),
        umbra::value::Value::Float64(n) => n.to_string(),
        umbra::value::Value::Bool(b) => b.to_string(),
        umbra::value::Value::Date(n) => n.to_string(),
        umbra::value::Value::Str(s) => s.clone(),
        umbra::value::Value::Null => "NULL".to_string(),
    }
}
