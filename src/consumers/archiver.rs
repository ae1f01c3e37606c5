//! The archiver: writes each processed view to rotating output files.
//!
//! The output file pattern accepts `%s` (the unix time of the file) plus
//! the usual strftime calendar substitutions. Rotation happens when a
//! view's time reaches the next rotation boundary; rotation times are
//! aligned to multiples of the interval unless disabled. After a file is
//! closed its name is written to the `latest_filename` file, if one is
//! configured. Closed files are not fsynced; readers pick them up through
//! the latest-file pointer.

use crate::error::BgpViewError;
use crate::io::file::{write_view, write_view_ascii};
use crate::view::BgpView;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{info, warn};
use std::fs::File;
use std::io::{BufWriter, Write};

/// Default gzip compression level.
pub const DEFAULT_COMPRESS_LEVEL: u32 = 6;

/// Output serialization format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    ASCII,
    BINARY,
}

/// Archiver configuration.
#[derive(Debug, Clone)]
pub struct ArchiverConfig {
    /// Output filename pattern; `%s` and strftime substitutions apply.
    pub outfile_pattern: String,
    /// File rotation period in seconds; 0 disables rotation.
    pub rotation_interval: u32,
    /// Align rotation times to multiples of the interval.
    pub rotation_align: bool,
    /// Gzip level (0-9), used when the pattern ends in `.gz`.
    pub compression_level: u32,
    pub output_format: OutputFormat,
    /// After rotation, the closed filename is written to this file.
    pub latest_filename: Option<String>,
}

impl ArchiverConfig {
    pub fn new(outfile_pattern: &str) -> Self {
        ArchiverConfig {
            outfile_pattern: outfile_pattern.to_string(),
            rotation_interval: 0,
            rotation_align: true,
            compression_level: DEFAULT_COMPRESS_LEVEL,
            output_format: OutputFormat::BINARY,
            latest_filename: None,
        }
    }
}

enum OutFile {
    Gz(GzEncoder<BufWriter<File>>),
    Plain(BufWriter<File>),
}

impl Write for OutFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            OutFile::Gz(w) => w.write(buf),
            OutFile::Plain(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            OutFile::Gz(w) => w.flush(),
            OutFile::Plain(w) => w.flush(),
        }
    }
}

impl OutFile {
    fn finish(self) -> std::io::Result<()> {
        match self {
            OutFile::Gz(w) => {
                let mut inner = w.finish()?;
                inner.flush()
            }
            OutFile::Plain(mut w) => w.flush(),
        }
    }
}

/// Writes views to rotating, optionally compressed output files.
pub struct Archiver {
    config: ArchiverConfig,
    outfile: Option<OutFile>,
    outfile_name: Option<String>,
    next_rotate_time: u32,
}

impl Archiver {
    pub fn new(config: ArchiverConfig) -> Result<Self, BgpViewError> {
        if config.compression_level > 9 {
            return Err(BgpViewError::InvalidArg(format!(
                "compression level {} out of range 0-9",
                config.compression_level
            )));
        }
        if config.outfile_pattern.is_empty() {
            return Err(BgpViewError::InvalidArg(
                "output file pattern must not be empty".to_string(),
            ));
        }
        // fail on malformed patterns up front, not at the first rotation
        generate_file_name(&config.outfile_pattern, 0)?;
        Ok(Archiver {
            config,
            outfile: None,
            outfile_name: None,
            next_rotate_time: 0,
        })
    }

    fn should_rotate(&self, time: u32) -> bool {
        self.config.rotation_interval > 0 && time >= self.next_rotate_time
    }

    /// Writes one view, rotating the output file first if due.
    pub fn process_view(&mut self, view: &BgpView) -> Result<(), BgpViewError> {
        let view_time = view.get_time();

        if self.outfile.is_none() || self.should_rotate(view_time) {
            self.complete_file()?;

            let mut file_time = view_time;
            if self.config.rotation_interval > 0 {
                if self.config.rotation_align {
                    file_time =
                        (view_time / self.config.rotation_interval) * self.config.rotation_interval;
                }
                self.next_rotate_time = file_time + self.config.rotation_interval;
            }

            let name = generate_file_name(&self.config.outfile_pattern, file_time)?;
            self.open_outfile(&name)?;
        }

        let outfile = self
            .outfile
            .as_mut()
            .ok_or_else(|| BgpViewError::Internal("archiver output file missing".to_string()))?;
        match self.config.output_format {
            OutputFormat::ASCII => write_view_ascii(outfile, view)?,
            OutputFormat::BINARY => write_view(outfile, view, None)?,
        }
        Ok(())
    }

    fn open_outfile(&mut self, name: &str) -> Result<(), BgpViewError> {
        info!("archiver opening {}", name);
        let file = BufWriter::new(File::create(name)?);
        let outfile = if name.ends_with(".gz") {
            OutFile::Gz(GzEncoder::new(
                file,
                Compression::new(self.config.compression_level),
            ))
        } else {
            OutFile::Plain(file)
        };
        self.outfile = Some(outfile);
        self.outfile_name = Some(name.to_string());
        Ok(())
    }

    // Closes the current output file and records it in the latest-file
    // pointer.
    fn complete_file(&mut self) -> Result<(), BgpViewError> {
        let Some(outfile) = self.outfile.take() else {
            return Ok(());
        };
        outfile.finish()?;

        let name = self.outfile_name.take();
        if let (Some(latest), Some(name)) = (&self.config.latest_filename, name) {
            std::fs::write(latest, format!("{}\n", name))?;
        }
        Ok(())
    }

    /// Closes the current output file, finalizing compression and updating
    /// the latest-file pointer.
    pub fn close(&mut self) -> Result<(), BgpViewError> {
        self.complete_file()
    }
}

impl Drop for Archiver {
    fn drop(&mut self) {
        if let Err(e) = self.complete_file() {
            warn!("failed to cleanly close archiver output: {}", e);
        }
    }
}

/// Expands an output file pattern for the given unix time: `%s` becomes
/// the time itself, everything else goes through strftime (UTC).
pub fn generate_file_name(pattern: &str, time: u32) -> Result<String, BgpViewError> {
    let mut expanded = String::with_capacity(pattern.len() + 8);
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '%' && chars.peek() == Some(&'s') {
            chars.next();
            expanded.push_str(&time.to_string());
        } else {
            expanded.push(c);
        }
    }

    if StrftimeItems::new(&expanded).any(|item| matches!(item, Item::Error)) {
        return Err(BgpViewError::InvalidArg(format!(
            "invalid output file pattern '{}'",
            pattern
        )));
    }

    let dt = DateTime::<Utc>::from_timestamp(time as i64, 0)
        .ok_or_else(|| BgpViewError::InvalidArg(format!("invalid file time {}", time)))?;
    Ok(dt.format(&expanded).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::file::read_view;
    use crate::view::BgpView;

    #[test]
    fn test_generate_file_name() {
        assert_eq!(
            generate_file_name("views.%s.bin", 1000).unwrap(),
            "views.1000.bin"
        );
        // strftime substitutions run in UTC
        assert_eq!(
            generate_file_name("views.%Y%m%d.%s.gz", 86400).unwrap(),
            "views.19700102.86400.gz"
        );
        assert_eq!(generate_file_name("plain.bin", 5).unwrap(), "plain.bin");
        assert!(matches!(
            generate_file_name("bad.%Q", 0),
            Err(BgpViewError::InvalidArg(_))
        ));
    }

    #[test]
    fn test_config_validation() {
        let mut config = ArchiverConfig::new("out.%s.bin");
        config.compression_level = 10;
        assert!(matches!(
            Archiver::new(config),
            Err(BgpViewError::InvalidArg(_))
        ));

        assert!(matches!(
            Archiver::new(ArchiverConfig::new("")),
            Err(BgpViewError::InvalidArg(_))
        ));

        let mut config = ArchiverConfig::new("out.%Q");
        config.rotation_interval = 60;
        assert!(matches!(
            Archiver::new(config),
            Err(BgpViewError::InvalidArg(_))
        ));
    }

    #[test]
    fn test_rotation_and_latest_file() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = dir.path().join("view.%s.bin");
        let latest = dir.path().join("latest");

        let mut config = ArchiverConfig::new(pattern.to_str().unwrap());
        config.rotation_interval = 100;
        config.latest_filename = Some(latest.to_str().unwrap().to_string());
        let mut archiver = Archiver::new(config).unwrap();

        let mut view = BgpView::new();
        view.set_time(150);
        archiver.process_view(&view).unwrap();
        view.set_time(210);
        // crosses the aligned rotation boundary at 200
        archiver.process_view(&view).unwrap();
        archiver.close().unwrap();

        let first = dir.path().join("view.100.bin");
        let second = dir.path().join("view.200.bin");
        assert!(first.exists());
        assert!(second.exists());
        // the latest-file pointer names the most recently closed file
        let pointed = std::fs::read_to_string(&latest).unwrap();
        assert_eq!(pointed.trim(), second.to_str().unwrap());

        // archived views decode
        let mut decoded = BgpView::new();
        let mut reader = File::open(&first).unwrap();
        assert!(read_view(&mut reader, &mut decoded).unwrap());
        assert_eq!(decoded.get_time(), 150);
        assert!(!read_view(&mut reader, &mut decoded).unwrap());
    }

    #[test]
    fn test_gz_output_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = dir.path().join("view.%s.gz");

        let mut archiver = Archiver::new(ArchiverConfig::new(pattern.to_str().unwrap())).unwrap();
        let mut view = BgpView::new();
        view.set_time(42);
        archiver.process_view(&view).unwrap();
        archiver.close().unwrap();

        let file = File::open(dir.path().join("view.42.gz")).unwrap();
        let mut gz = flate2::read::GzDecoder::new(file);
        let mut decoded = BgpView::new();
        assert!(read_view(&mut gz, &mut decoded).unwrap());
        assert_eq!(decoded.get_time(), 42);
    }

    #[test]
    fn test_ascii_output() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = dir.path().join("view.%s.txt");

        let mut config = ArchiverConfig::new(pattern.to_str().unwrap());
        config.output_format = OutputFormat::ASCII;
        let mut archiver = Archiver::new(config).unwrap();
        let mut view = BgpView::new();
        view.set_time(42);
        archiver.process_view(&view).unwrap();
        archiver.close().unwrap();

        let text = std::fs::read_to_string(dir.path().join("view.42.txt")).unwrap();
        assert!(text.starts_with("# View 42\n"));
    }
}
