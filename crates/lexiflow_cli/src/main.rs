//! Local operator entry point for the daily bonus reward.
//!
//! # Responsibility
//! - Seed the public word pool and per-user daily records in a SQLite file.
//! - Run one rewarded-ad claim through the JSON boundary and print the reply.
//!
//! Tunables come from `LEXIFLOW_*` environment variables.

use clap::{Parser, Subcommand};
use lexiflow_core::db::open_db;
use lexiflow_core::{
    default_log_level, handle_claim, init_logging_with, Clock, DailyRecord, DailyRepository,
    DayId, LogEcho, RewardConfig, RewardService, SqliteDailyRepository, SystemClock,
    TimeProvider, UserId,
};
use log::info;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "lexiflow", version, about = "Daily bonus word reward tools")]
struct Cli {
    /// Absolute directory for rolling log files; logging is off when unset
    #[arg(long, env = "LEXIFLOW_LOG_DIR")]
    log_dir: Option<String>,
    /// Defaults to `debug` in debug builds and `info` in release builds
    #[arg(long, default_value = default_log_level())]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print today's day id at the configured UTC offset
    Today,
    /// Add words to the shared bonus pool
    SeedPool {
        #[arg(long)]
        db: PathBuf,
        #[arg(required = true)]
        words: Vec<String>,
    },
    /// Create a user's daily record with its assigned words
    InitDay {
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        user: String,
        /// Defaults to today
        #[arg(long)]
        day: Option<String>,
        words: Vec<String>,
    },
    /// Claim the rewarded-ad bonus and print the JSON reply
    Claim {
        #[arg(long)]
        db: PathBuf,
        /// Verified identity of the caller
        #[arg(long, env = "LEXIFLOW_CALLER")]
        caller: Option<String>,
        /// Builds `{"userId": ...}` when no raw payload is given
        #[arg(long, conflicts_with = "payload")]
        user: Option<String>,
        #[arg(long)]
        payload: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Some(log_dir) = cli.log_dir.as_deref() {
        if let Err(err) = init_logging_with(&cli.log_level, log_dir, LogEcho::StderrWarnings) {
            eprintln!("logging disabled: {err}");
        }
    }

    match run(cli.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<ExitCode, String> {
    let config = RewardConfig::from_env().map_err(|err| err.to_string())?;

    match command {
        Commands::Today => {
            let time = TimeProvider::new(SystemClock, config.utc_offset_minutes);
            println!("{}", time.today());
        }
        Commands::SeedPool { db, words } => {
            let conn = open_db(&db).map_err(|err| err.to_string())?;
            let repo = SqliteDailyRepository::new(&conn);
            let inserted = repo
                .insert_public_words(&words)
                .map_err(|err| err.to_string())?;
            info!("event=pool_seed module=cli status=ok inserted={inserted}");
            println!("inserted {inserted} of {} words", words.len());
        }
        Commands::InitDay {
            db,
            user,
            day,
            words,
        } => {
            let user_id = UserId::parse(&user).map_err(|err| err.to_string())?;
            let time = TimeProvider::new(SystemClock, config.utc_offset_minutes);
            let day_id = match day {
                Some(raw) => DayId::parse(&raw).map_err(|err| err.to_string())?,
                None => time.today(),
            };
            let conn = open_db(&db).map_err(|err| err.to_string())?;
            let repo = SqliteDailyRepository::new(&conn);
            let record = DailyRecord::new(day_id.clone(), words, SystemClock.now_ms());
            repo.insert_daily_record(&user_id, &record)
                .map_err(|err| err.to_string())?;
            println!("created daily record for {day_id}");
        }
        Commands::Claim {
            db,
            caller,
            user,
            payload,
        } => {
            let payload = match (payload, user) {
                (Some(raw), _) => raw,
                (None, Some(user)) => serde_json::json!({ "userId": user }).to_string(),
                (None, None) => "{}".to_string(),
            };
            let conn = open_db(&db).map_err(|err| err.to_string())?;
            let repo = SqliteDailyRepository::new(&conn);
            let service = RewardService::try_new(repo, config).map_err(|err| err.to_string())?;

            let (encoded, code) = match handle_claim(&service, caller.as_deref(), &payload) {
                Ok(response) => (serde_json::to_string(&response), ExitCode::SUCCESS),
                Err(err) => (serde_json::to_string(&err), ExitCode::FAILURE),
            };
            println!("{}", encoded.map_err(|err| err.to_string())?);
            return Ok(code);
        }
    }
    Ok(ExitCode::SUCCESS)
}
