use std::sync::Once;

static INIT: Once = Once::new();

/// Configure logging globally for the process with a rolling file appender.
/// - `dir`: base directory for log files; current directory if `None`.
/// - `level`: error|warn|info|debug|trace (default info).
/// - `retention`: number of rolled files to keep (default 7).
///
/// Safe to call more than once; only the first call installs a config.
pub fn configure_logging(
    dir: Option<&std::path::Path>,
    level: Option<&str>,
    retention: Option<usize>,
) {
    use log::LevelFilter;
    use log4rs::append::rolling_file::RollingFileAppender;
    use log4rs::append::rolling_file::policy::compound::{
        CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
    };
    use log4rs::config::{Appender, Config, Root};
    use log4rs::encode::pattern::PatternEncoder;
    use std::path::PathBuf;

    INIT.call_once(|| {
        let base = dir
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        if std::fs::create_dir_all(&base).is_err() {
            return;
        }
        let keep = retention.unwrap_or(7) as u32;
        let lvl = match level.unwrap_or("info").to_ascii_lowercase().as_str() {
            "error" => LevelFilter::Error,
            "warn" => LevelFilter::Warn,
            "debug" => LevelFilter::Debug,
            "trace" => LevelFilter::Trace,
            _ => LevelFilter::Info,
        };
        let enc_pattern = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
        let Ok(roller) =
            FixedWindowRoller::builder().build(&format!("{}", base.join("plumedb.{}.log").display()), keep)
        else {
            return;
        };
        let policy =
            CompoundPolicy::new(Box::new(SizeTrigger::new(10 * 1024 * 1024)), Box::new(roller));
        let Ok(appender) = RollingFileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(enc_pattern)))
            .build(base.join("plumedb.log"), Box::new(policy))
        else {
            return;
        };
        let Ok(config) = Config::builder()
            .appender(Appender::builder().build("file", Box::new(appender)))
            .build(Root::builder().appender("file").build(lvl))
        else {
            return;
        };
        let _ = log4rs::init_config(config);
    });
}

/// Configure logging from environment variables if present:
/// - `PLUMEDB_LOG_DIR`
/// - `PLUMEDB_LOG_LEVEL`
/// - `PLUMEDB_LOG_RETENTION`
pub fn configure_from_env() {
    let dir = std::env::var("PLUMEDB_LOG_DIR").ok().map(std::path::PathBuf::from);
    let level = std::env::var("PLUMEDB_LOG_LEVEL").ok();
    let retention =
        std::env::var("PLUMEDB_LOG_RETENTION").ok().and_then(|s| s.parse::<usize>().ok());
    configure_logging(dir.as_deref(), level.as_deref(), retention);
}
