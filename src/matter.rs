//! Front-matter scanning.
//!
//! A document may open with a metadata block fenced by a delimiter token,
//! followed by free-form body text:
//!
//! ```text
//! ---                 ← opening delimiter (must start the input)
//! title: Hello
//! section: blog       ← metadata block, handed to the decoder
//! ---                 ← closing delimiter (next occurrence of the token)
//! Body text. A later `---` here is body, never another split.
//! ```
//!
//! [`Matter::parse`] reads the input incrementally and stops as soon as the
//! closing delimiter has been seen. Only the metadata block (plus whatever
//! the last read pulled in after it) is ever buffered; the body is returned
//! as a [`Body`] reader that drains that small remainder and then continues
//! on the untouched input stream. An opening delimiter that is never closed
//! would otherwise pull the whole input into memory, so the search gives up
//! once [`MAX_FRONT_MATTER`] bytes are buffered (see [`Matter::with_limit`]).
//!
//! ## Delimiter selection
//!
//! With a configured delimiter the scanner looks for exactly that token.
//! Without one it sniffs the first three bytes of input and caches the result
//! on the scanner, so a scanner that sniffed `+++` keeps expecting `+++` until
//! [`Matter::reset`]. Concurrent loaders take a [`Matter::fresh`] copy per
//! document.
//!
//! ## Outcomes
//!
//! | Input | Result |
//! |-------|--------|
//! | fewer than 4 bytes, no configured delimiter | [`MatterError::EmptyInput`] |
//! | delimiter without a registered decoder | [`MatterError::UnknownDelimiter`] |
//! | opening and closing delimiter | decoded metadata, body after the closing token |
//! | no opening delimiter at byte 0, or no closing one | empty metadata, whole input is body |
//! | no closing delimiter within the scan limit | empty metadata, whole input is body |
//! | block the decoder rejects | [`MatterError::MalformedMetadata`] |

use crate::decode::{DecodeError, DecoderRegistry, JsonDecoder, TomlDecoder, YamlDecoder};
use crate::value::Metadata;
use std::io::{self, Chain, Cursor, Read};
use std::sync::Arc;
use thiserror::Error;

/// Delimiter used by the YAML constructors when none is given.
pub const DEFAULT_DELIMITER: &str = "---";

/// Bytes needed before a delimiter can be sniffed.
const SNIFF_MIN: usize = 4;
const SNIFF_LEN: usize = 3;

const CHUNK_SIZE: usize = 8 * 1024;

/// Bytes buffered while looking for a closing delimiter before the document
/// is treated as having no front matter.
pub const MAX_FRONT_MATTER: usize = 1024 * 1024;

#[derive(Error, Debug)]
pub enum MatterError {
    #[error("input too short to carry front matter")]
    EmptyInput,
    #[error("no decoder registered for delimiter {0:?}")]
    UnknownDelimiter(String),
    #[error("malformed metadata in {delimiter:?} block: {cause}")]
    MalformedMetadata {
        delimiter: String,
        #[source]
        cause: DecodeError,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Front-matter scanner bound to one decoder registry.
#[derive(Debug, Clone)]
pub struct Matter {
    registry: Arc<DecoderRegistry>,
    configured: Option<String>,
    sniffed: Option<String>,
    limit: usize,
}

/// The result of splitting one document.
#[derive(Debug)]
pub struct Parsed<R> {
    /// Decoded metadata; empty when the document has no front matter.
    pub metadata: Metadata,
    /// The trimmed metadata text as it appeared between the delimiters.
    pub front: String,
    /// The delimiter that fenced the block, `None` without front matter.
    pub delimiter: Option<String>,
    /// Everything after the closing delimiter.
    pub body: Body<R>,
}

/// Readable remainder of a document after its front matter.
///
/// Yields the bytes buffered past the closing delimiter, then keeps reading
/// from the original input.
#[derive(Debug)]
pub struct Body<R> {
    inner: Chain<Cursor<Vec<u8>>, R>,
    offset: u64,
}

impl<R: Read> Body<R> {
    fn new(head: Vec<u8>, rest: R, offset: u64) -> Self {
        Self {
            inner: Cursor::new(head).chain(rest),
            offset,
        }
    }

    /// Byte position in the original input where the body starts.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn into_string(mut self) -> io::Result<String> {
        let mut s = String::new();
        self.inner.read_to_string(&mut s)?;
        Ok(s)
    }
}

impl<R: Read> Read for Body<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Matter {
    /// A scanner that sniffs its delimiter from each input.
    pub fn new(registry: DecoderRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            configured: None,
            sniffed: None,
            limit: MAX_FRONT_MATTER,
        }
    }

    /// Sniffing scanner over the standard `---`/`+++`/`;;;` registry.
    pub fn standard() -> Self {
        Self::new(DecoderRegistry::standard())
    }

    /// YAML front matter fenced by `delimiter` (default `---`).
    pub fn yaml(delimiter: Option<&str>) -> Self {
        let delim = delimiter.unwrap_or(DEFAULT_DELIMITER);
        Self::new(DecoderRegistry::new().with(delim, YamlDecoder)).with_delimiter(delim)
    }

    /// JSON front matter fenced by `delimiter` (default `---`).
    pub fn json(delimiter: Option<&str>) -> Self {
        let delim = delimiter.unwrap_or(DEFAULT_DELIMITER);
        Self::new(DecoderRegistry::new().with(delim, JsonDecoder)).with_delimiter(delim)
    }

    /// TOML front matter fenced by `delimiter` (default `---`).
    pub fn toml(delimiter: Option<&str>) -> Self {
        let delim = delimiter.unwrap_or(DEFAULT_DELIMITER);
        Self::new(DecoderRegistry::new().with(delim, TomlDecoder)).with_delimiter(delim)
    }

    /// Fix the delimiter instead of sniffing it.
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.configured = Some(delimiter.into());
        self.sniffed = None;
        self
    }

    /// Give up looking for the closing delimiter once `limit` bytes are
    /// buffered.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn registry(&self) -> &DecoderRegistry {
        &self.registry
    }

    /// The delimiter this scanner will look for next, if already known.
    pub fn delimiter(&self) -> Option<&str> {
        self.configured.as_deref().or(self.sniffed.as_deref())
    }

    /// Forget a sniffed delimiter. A configured delimiter is kept.
    pub fn reset(&mut self) {
        self.sniffed = None;
    }

    /// An independent scanner sharing this one's registry and configuration,
    /// with no sniffed state.
    pub fn fresh(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            configured: self.configured.clone(),
            sniffed: None,
            limit: self.limit,
        }
    }

    /// Split `input` into decoded metadata and a body reader.
    pub fn parse<R: Read>(&mut self, mut input: R) -> Result<Parsed<R>, MatterError> {
        let mut buf = Vec::new();
        let mut eof = false;

        let delim = match self.delimiter() {
            Some(d) => d.to_string(),
            None => {
                eof = fill_to(&mut input, &mut buf, SNIFF_MIN)?;
                if buf.len() < SNIFF_MIN {
                    return Err(MatterError::EmptyInput);
                }
                let sniffed = String::from_utf8_lossy(&buf[..SNIFF_LEN]).into_owned();
                self.sniffed = Some(sniffed.clone());
                sniffed
            }
        };
        let Some(decoder) = self.registry.get(&delim) else {
            return Err(MatterError::UnknownDelimiter(delim));
        };
        let token = delim.as_bytes();
        if token.is_empty() {
            return Err(MatterError::UnknownDelimiter(delim));
        }

        if !eof {
            eof = fill_to(&mut input, &mut buf, token.len())?;
        }
        if !buf.starts_with(token) {
            return Ok(no_front_matter(buf, input));
        }

        // Search for the closing token, reading more input only while needed.
        // Each pass rescans the last `token.len() - 1` bytes of the previous
        // buffer so a token split across two reads is still found.
        let mut search_from = token.len();
        let close = loop {
            if let Some(pos) = find(&buf[search_from..], token) {
                break search_from + pos;
            }
            if eof || buf.len() >= self.limit {
                return Ok(no_front_matter(buf, input));
            }
            search_from = search_from.max((buf.len() + 1).saturating_sub(token.len()));
            eof = read_chunk(&mut input, &mut buf)? == 0;
        };

        let front = std::str::from_utf8(&buf[token.len()..close])
            .map_err(|e| MatterError::MalformedMetadata {
                delimiter: delim.clone(),
                cause: DecodeError::from(e),
            })?
            .trim()
            .to_string();
        let metadata = decoder
            .decode(&front)
            .map_err(|cause| MatterError::MalformedMetadata {
                delimiter: delim.clone(),
                cause,
            })?;

        let body_start = close + token.len();
        let head = buf.split_off(body_start);
        Ok(Parsed {
            metadata,
            front,
            delimiter: Some(delim),
            body: Body::new(head, input, body_start as u64),
        })
    }
}

impl Default for Matter {
    fn default() -> Self {
        Self::standard()
    }
}

fn no_front_matter<R: Read>(buf: Vec<u8>, input: R) -> Parsed<R> {
    Parsed {
        metadata: Metadata::default(),
        front: String::new(),
        delimiter: None,
        body: Body::new(buf, input, 0),
    }
}

/// Read until `buf` holds at least `min` bytes or the input ends.
/// Returns whether the input ended.
fn fill_to<R: Read>(input: &mut R, buf: &mut Vec<u8>, min: usize) -> io::Result<bool> {
    while buf.len() < min {
        if read_chunk(input, buf)? == 0 {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Append one read's worth of bytes to `buf`, retrying on `Interrupted`.
fn read_chunk<R: Read>(input: &mut R, buf: &mut Vec<u8>) -> io::Result<usize> {
    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        match input.read(&mut chunk) {
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                return Ok(n);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
