pub mod core;
pub mod frame_extractor;

use chrono::Local;
use env_logger::{Builder, Env, Target};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Mirrors every log line to stderr and a log file.
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

/// Install the logger. `RUST_LOG` wins over `level`.
///
/// With `log_dir`, lines are also written to
/// `log_dir/logs/frame_extractor_<YYYYmmdd_HHMMSS>.log`, whose path is returned.
pub fn init_logging(level: &str, log_dir: Option<&Path>) -> crate::core::Result<Option<PathBuf>> {
    let mut builder = Builder::from_env(Env::default().default_filter_or(level));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} - {} - {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.args()
        )
    });

    let log_file = match log_dir {
        Some(dir) => {
            let logs = dir.join("logs");
            fs::create_dir_all(&logs)?;
            let path = logs.join(format!(
                "frame_extractor_{}.log",
                Local::now().format("%Y%m%d_%H%M%S")
            ));
            let file = File::create(&path)?;
            builder.target(Target::Pipe(Box::new(TeeWriter { file })));
            Some(path)
        }
        None => None,
    };

    // 重复初始化（例如测试里）直接忽略
    let _ = builder.try_init();
    Ok(log_file)
}
