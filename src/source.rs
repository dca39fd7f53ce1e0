// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of table-read, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

use std::{
    fmt::{self, Debug, Formatter},
    fs::File,
    io::{self, Cursor, Read},
    path::{Path, PathBuf},
    process::{Child, ChildStdout, Command, Stdio},
    sync::OnceLock,
};

use flate2::read::MultiGzDecoder;
use regex::Regex;
use tracing::debug;
use xz2::read::XzDecoder;

use crate::read::ReadError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const XZ_MAGIC: [u8; 6] = [0xfd, b'7', b'z', b'X', b'Z', 0x00];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

/// Where the bytes come from.
///
/// Strings convert to either [`Source::Url`] (when they match `^\w+://`) or
/// [`Source::Path`]. Compression is detected from the stream head regardless
/// of the source kind.
pub enum Source {
    /// A local file.
    Path(PathBuf),
    /// A URL fetched through an external downloader (`curl`, falling back to
    /// `wget`).
    Url(String),
    /// An external command whose standard output is parsed.
    Command { program: String, args: Vec<String> },
    /// Any caller-supplied stream.
    Reader(Box<dyn Read>),
}

impl Source {
    pub fn command<S: Into<String>>(program: S, args: impl IntoIterator<Item = S>) -> Self {
        Source::Command {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn reader(r: impl Read + 'static) -> Self {
        Source::Reader(Box::new(r))
    }

    /// Opens the source and interposes a decompressor when the stream head
    /// carries a known magic.
    pub(crate) fn open(self) -> Result<Box<dyn Read>, ReadError> {
        let raw: Box<dyn Read> = match self {
            Source::Path(path) => Box::new(File::open(path)?),
            Source::Url(url) => Box::new(fetch_url(&url)?),
            Source::Command { program, args } => {
                let mut command = Command::new(&program);
                command.args(&args);
                Box::new(spawn(&mut command)?)
            }
            Source::Reader(r) => r,
        };
        Ok(decompress(raw)?)
    }
}

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\w+://").unwrap())
}

impl From<&str> for Source {
    fn from(s: &str) -> Self {
        if url_re().is_match(s) {
            Source::Url(s.to_owned())
        } else {
            Source::Path(PathBuf::from(s))
        }
    }
}

impl From<String> for Source {
    fn from(s: String) -> Self {
        Source::from(s.as_str())
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        Source::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

impl Debug for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Source::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Source::Url(url) => f.debug_tuple("Url").field(url).finish(),
            Source::Command { program, args } => f
                .debug_struct("Command")
                .field("program", program)
                .field("args", args)
                .finish(),
            Source::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

/// Reads up to six bytes off the stream head and frames the rest through the
/// decoder whose magic matches, if any. The sniffed bytes are chained back in
/// front.
fn decompress(mut r: Box<dyn Read>) -> io::Result<Box<dyn Read>> {
    let mut head = [0u8; 6];
    let mut filled = 0;
    while filled < head.len() {
        let n = r.read(&mut head[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    let head = &head[..filled];
    let rest = Cursor::new(head.to_vec()).chain(r);
    Ok(if head.starts_with(&GZIP_MAGIC) {
        debug!("gzip framing detected");
        Box::new(MultiGzDecoder::new(rest))
    } else if head.starts_with(&XZ_MAGIC) {
        debug!("xz framing detected");
        Box::new(XzDecoder::new(rest))
    } else if head.starts_with(&ZSTD_MAGIC) {
        debug!("zstd framing detected");
        Box::new(zstd::stream::read::Decoder::new(rest)?)
    } else {
        Box::new(rest)
    })
}

/// A child process streaming its standard output. The process is killed and
/// reaped when the stream is dropped.
struct ChildStream {
    child: Child,
    stdout: ChildStdout,
}

impl Read for ChildStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stdout.read(buf)
    }
}

impl Drop for ChildStream {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn spawn(command: &mut Command) -> io::Result<ChildStream> {
    let mut child = command.stdout(Stdio::piped()).spawn()?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "child stdout not captured"))?;
    Ok(ChildStream { child, stdout })
}

fn fetch_url(url: &str) -> Result<ChildStream, ReadError> {
    let downloaders: [(&str, &[&str]); 2] = [
        ("curl", &["--fail", "--silent", "--show-error", "--location"]),
        ("wget", &["-q", "-O", "-"]),
    ];
    for (program, args) in downloaders {
        let mut command = Command::new(program);
        command.args(args).arg(url).stderr(Stdio::null());
        match spawn(&mut command) {
            Ok(stream) => {
                debug!(program, url, "fetching");
                return Ok(stream);
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Err(ReadError::MissingDownloader)
}
