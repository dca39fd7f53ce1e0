// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of table-read, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

use std::{
    fmt::{self, Debug, Formatter},
    io::{self, Read},
};

use bstr::ByteSlice;
use memchr::{memchr2, memrchr2};

/// The rolling byte window over the (possibly decompressed) input stream.
///
/// The buffer holds the unconsumed tail of the stream. [`buffer_lines`]
/// refills it to the target size and locates the last complete record
/// terminator; the driver tokenizes up to that point and then [`advance`]s
/// past what it consumed. Tokens index into the window, so nothing may retain
/// one across an `advance`.
///
/// [`buffer_lines`]: InputBuffer::buffer_lines
/// [`advance`]: InputBuffer::advance
pub(super) struct InputBuffer<R> {
    r: R,
    buf: Vec<u8>,
    /// Refill goal in bytes. Doubled whenever a record or an ambiguous CR
    /// seam outgrows the window.
    target: usize,
    eof: bool,
}

impl<R: Read> InputBuffer<R> {
    pub(super) fn new(r: R, target: usize) -> Self {
        debug_assert!(target > 0, "zero chunk size must use slurp");
        InputBuffer {
            r,
            buf: Vec::new(),
            target,
            eof: false,
        }
    }

    /// Reads the whole stream into one window up front. Used when chunking
    /// is disabled.
    pub(super) fn slurp(mut r: R) -> io::Result<Self> {
        let mut buf = Vec::new();
        r.read_to_end(&mut buf)?;
        let target = buf.len().max(1);
        Ok(InputBuffer {
            r,
            buf,
            target,
            eof: true,
        })
    }

    #[inline(always)]
    pub(super) fn mem(&self) -> &[u8] {
        &self.buf
    }

    #[inline(always)]
    pub(super) fn eof(&self) -> bool {
        self.eof
    }

    /// Consumes `n` bytes from the front of the window. Tokens created
    /// before this call are invalidated.
    pub(super) fn advance(&mut self, n: usize) {
        self.buf.drain(..n);
    }

    /// Pulls bytes from the stream until the window reaches the target size
    /// or the stream ends.
    fn refill(&mut self) -> io::Result<()> {
        while !self.eof && self.buf.len() < self.target {
            let old = self.buf.len();
            self.buf.resize(self.target, 0);
            let n = self.r.read(&mut self.buf[old..])?;
            self.buf.truncate(old + n);
            if n == 0 {
                self.eof = true;
            }
        }
        Ok(())
    }

    /// Doubles the refill target so the next refill makes progress even when
    /// the window is already full.
    pub(super) fn grow(&mut self) {
        self.target = self.target.max(self.buf.len()).saturating_mul(2).max(64);
    }

    /// Advances past `n` newlines (LF, CR, or CR+LF, each counted once),
    /// growing the window as needed. Stops early at EOF and returns the
    /// number actually skipped.
    pub(super) fn skip_lines(&mut self, n: u64) -> io::Result<u64> {
        let mut skipped = 0;
        while skipped < n {
            match first_terminator(&self.buf, 0, self.eof) {
                Some(end) => {
                    self.advance(end);
                    skipped += 1;
                }
                None if self.eof => break,
                None => {
                    if self.buf.len() >= self.target {
                        self.grow();
                    }
                    self.refill()?;
                }
            }
        }
        Ok(skipped)
    }

    /// Refills the window and returns the offset of the last complete record
    /// terminator, or `None` when the stream is exhausted.
    ///
    /// A lone CR at the buffered edge is ambiguous (it could be half of a
    /// CR+LF), so the window is grown until the byte after it is observed or
    /// the stream ends. A stream that ends without a final newline gets an
    /// LF appended so downstream parsing sees a terminated record.
    ///
    /// On `Some(lastnl)`, `mem()[lastnl]` is LF or CR.
    pub(super) fn buffer_lines(&mut self) -> io::Result<Option<usize>> {
        loop {
            self.refill()?;
            if self.buf.is_empty() {
                return Ok(None);
            }
            match memrchr2(b'\n', b'\r', &self.buf) {
                Some(i) if self.buf[i] == b'\r' && i + 1 == self.buf.len() && !self.eof => {
                    self.grow();
                }
                Some(i) => return Ok(Some(i)),
                None if self.eof => {
                    self.buf.push(b'\n');
                    return Ok(Some(self.buf.len() - 1));
                }
                None => self.grow(),
            }
        }
    }
}

impl<R> Debug for InputBuffer<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputBuffer")
            .field("buf", &self.buf.as_bstr())
            .field("target", &self.target)
            .field("eof", &self.eof)
            .finish()
    }
}

/// Finds the first record terminator in `mem` at or after `i` and returns
/// the offset just past it, consuming the LF of a CR+LF pair. Returns `None`
/// when there is no terminator, or when a trailing CR cannot be classified
/// yet because the byte after it is not buffered.
pub(super) fn first_terminator(mem: &[u8], i: usize, eof: bool) -> Option<usize> {
    let nl = i + memchr2(b'\n', b'\r', &mem[i..])?;
    if mem[nl] == b'\n' {
        Some(nl + 1)
    } else if nl + 1 < mem.len() {
        Some(if mem[nl + 1] == b'\n' { nl + 2 } else { nl + 1 })
    } else if eof {
        Some(nl + 1)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn buffer(data: &[u8], target: usize) -> InputBuffer<Cursor<Vec<u8>>> {
        InputBuffer::new(Cursor::new(data.to_vec()), target)
    }

    #[test]
    fn last_terminator_in_window() {
        let mut input = buffer(b"a,b\nc,d\ne,", 1 << 20);
        let lastnl = input.buffer_lines().unwrap().unwrap();
        assert_eq!(lastnl, 7);
        assert_eq!(input.mem()[lastnl], b'\n');
    }

    #[test]
    fn appends_lf_when_stream_is_unterminated() {
        let mut input = buffer(b"a\n1", 1 << 20);
        assert_eq!(input.buffer_lines().unwrap(), Some(1));
        input.advance(2);
        assert_eq!(input.buffer_lines().unwrap(), Some(1));
        assert_eq!(input.mem(), b"1\n");
        input.advance(2);
        assert_eq!(input.buffer_lines().unwrap(), None);
    }

    #[test]
    fn cr_at_window_edge_is_grown_before_classifying() {
        // The first window ends exactly on the CR of a CR+LF pair.
        let mut input = buffer(b"ab\r\ncd\r\n", 3);
        let lastnl = input.buffer_lines().unwrap().unwrap();
        assert!(input.mem().len() > 3);
        assert!(matches!(input.mem()[lastnl], b'\n' | b'\r'));
        assert_ne!(lastnl, 2, "ambiguous CR must not be the terminator");
    }

    #[test]
    fn trailing_cr_at_eof_is_a_terminator() {
        let mut input = buffer(b"ab\r", 1 << 20);
        assert_eq!(input.buffer_lines().unwrap(), Some(2));
    }

    #[test]
    fn skip_lines_mixed_terminators() {
        let mut input = buffer(b"one\ntwo\rthree\r\nrest\n", 4);
        assert_eq!(input.skip_lines(3).unwrap(), 3);
        input.refill().unwrap();
        assert!(input.mem().starts_with(b"rest"));
    }

    #[test]
    fn skip_lines_stops_at_eof() {
        let mut input = buffer(b"one\ntwo\n", 1 << 20);
        assert_eq!(input.skip_lines(5).unwrap(), 2);
        assert_eq!(input.buffer_lines().unwrap(), None);
    }

    #[test]
    fn grow_makes_room_for_long_records() {
        let mut input = buffer(b"0123456789abcdef\n", 4);
        let lastnl = input.buffer_lines().unwrap().unwrap();
        assert_eq!(lastnl, 16);
    }

    #[test]
    fn first_terminator_crlf_seam() {
        assert_eq!(first_terminator(b"a\nb", 0, false), Some(2));
        assert_eq!(first_terminator(b"a\rb", 0, false), Some(2));
        assert_eq!(first_terminator(b"a\r\nb", 0, false), Some(3));
        assert_eq!(first_terminator(b"a\r", 0, false), None);
        assert_eq!(first_terminator(b"a\r", 0, true), Some(2));
        assert_eq!(first_terminator(b"ab", 0, true), None);
    }
}
