use anyhow::{bail, Context};
use clap::Parser;
use itertools::Itertools;
use log::LevelFilter;
use pldbg::debugger::{
    parse_break_notice, ChannelObserver, Client, PostgresConnection, Resolver, RoutineCache,
    SessionWorker, TargetCall, NOTICE_LOG_TARGET,
};
use pldbg::log::ForwardingLogger;
use pldbg::ui::config::{self, ConnectionConfig, FileConfig};
use pldbg::ui::console::TerminalApplication;
use pldbg::weak_error;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Connection URL, like postgres://user@localhost/db
    #[clap(long, env = "PLDBG_URL")]
    url: Option<String>,

    #[clap(short = 'H', long)]
    host: Option<String>,

    #[clap(short, long)]
    port: Option<u16>,

    #[clap(short = 'U', long)]
    user: Option<String>,

    #[clap(short, long)]
    database: Option<String>,

    /// Path to the configuration file (default: ~/.config/pldbg/config.toml)
    #[clap(long)]
    config: Option<PathBuf>,

    /// Attach to a backend waiting on a debugger port.
    /// Accepts the port number or the whole `PLDBGBREAK:<port>` notice text.
    #[clap(short, long, conflicts_with_all = ["routine", "call"])]
    attach: Option<String>,

    /// Wait until any backend calls the routine (oid or [schema.]name) and attach to it
    #[clap(short, long, conflicts_with = "call")]
    routine: Option<String>,

    /// Like --routine, the routine is taken from a call statement (SELECT f(1, 2))
    #[clap(long)]
    call: Option<String>,

    /// Run the --call statement on its own connection and debug it, instead of
    /// waiting for another backend to call the routine
    #[clap(long, requires = "call")]
    direct: bool,

    /// Time (ms) given to the --direct statement to stop in the debugger
    #[clap(long, default_value_t = 3000)]
    attach_timeout: u64,
}

enum Target {
    Port(i64),
    Routine(i64),
}

fn parse_port(text: &str) -> anyhow::Result<i64> {
    let text = text.trim();
    if let Ok(port) = text.parse::<i64>() {
        return Ok(port);
    }
    parse_break_notice(text).with_context(|| format!("not a debugger port: `{text}`"))
}

fn resolve_target(args: &Args, client: &mut Client<PostgresConnection>) -> anyhow::Result<Target> {
    if let Some(attach) = &args.attach {
        return Ok(Target::Port(parse_port(attach)?));
    }

    let cache = RoutineCache::default();
    let mut resolver = Resolver::new(client, &cache);
    let routine = match (&args.routine, &args.call) {
        (Some(routine), _) => match routine.trim().parse::<i64>() {
            Ok(oid) => resolver.by_oid(oid)?,
            Err(_) => resolver.by_name(routine, None)?,
        },
        (None, Some(call)) => resolver.by_call(call)?,
        (None, None) => bail!("one of --attach, --routine or --call is required"),
    };
    log::info!(target: "debugger", "target routine {}", routine.qualified_name());

    Ok(Target::Routine(routine.oid()))
}

fn main() -> anyhow::Result<()> {
    let logger = env_logger::Logger::from_default_env();
    let filter = logger.filter();
    // server notices arrive as info records
    let (logger, notices) = ForwardingLogger::new(logger, NOTICE_LOG_TARGET);
    pldbg::log::LOGGER_SWITCHER.switch(logger, filter.max(LevelFilter::Info));

    let args = Args::parse();

    let file_config = match args.config.clone().or_else(config::default_path) {
        Some(path) => FileConfig::load(&path)
            .with_context(|| format!("read configuration {}", path.display()))?,
        None => FileConfig::default(),
    };
    config::set(file_config.console.into());

    let connection = ConnectionConfig {
        url: args.url.clone(),
        host: args.host.clone(),
        port: args.port,
        user: args.user.clone(),
        password: None,
        database: args.database.clone(),
        application_name: None,
    }
    .or(file_config.connection);
    let options = connection
        .connect_options()
        .context("invalid connection settings")?;

    // control connection: extension check and routine resolution
    let mut control = Client::new(PostgresConnection::connect(options.clone())?);
    let extension = control.check_extension()?;
    log::info!(
        target: "debugger",
        "{} {} found in schema {}",
        extension.name,
        extension.version,
        extension.schema
    );
    let target = resolve_target(&args, &mut control);
    weak_error!(control.close(), "close control connection:");
    let target = target?;

    let conn = PostgresConnection::connect(options.clone())?;
    let (observer, events) = ChannelObserver::new();
    let mut direct_call = None;
    let worker = match (target, &args.call) {
        (Target::Port(port), _) => SessionWorker::attach(conn, port, observer)?,
        (Target::Routine(oid), Some(sql)) if args.direct => {
            let target = Client::new(PostgresConnection::connect(options)?);
            let timeout = Duration::from_millis(args.attach_timeout);
            let call = TargetCall::start(target, oid, sql, &notices, timeout)?;
            println!("routine {oid} stopped, attach to port {}", call.port());
            let worker = match SessionWorker::attach(conn, call.port(), observer) {
                Ok(worker) => worker,
                Err(e) => {
                    weak_error!(call.cancel(), "cancel target statement:");
                    return Err(e.into());
                }
            };
            direct_call = Some(call);
            worker
        }
        (Target::Routine(oid), _) => {
            println!("waiting for a backend to call routine {oid}...");
            SessionWorker::wait_for_routine(conn, oid, observer)?
        }
    };

    TerminalApplication::new(worker, events)?.run()?;

    if let Some(call) = direct_call {
        match call.wait() {
            Ok(rows) => {
                for row in rows {
                    println!(
                        "{}",
                        (0..row.len())
                            .map(|idx| row.column(idx).unwrap_or("NULL"))
                            .join(" | ")
                    );
                }
            }
            Err(e) => println!("target statement: {e:#}"),
        }
    }
    Ok(())
}
