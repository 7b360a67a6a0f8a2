//! Optional content decoding of inbound `DATA` frames.
//!
//! When a [`DecompressorFactory`] is configured, the bridge routes inbound
//! frames through a [`DecompressingListener`] before they reach the
//! connection. Streams whose first `HEADERS` carry a `content-encoding` the
//! factory recognises have that header and `content-length` removed and their
//! `DATA` payloads decoded. Everything else passes through unchanged.
//!
//! With the `decompression` feature, `ContentDecoders` provides decoders for
//! `gzip`, `x-gzip`, `deflate` and `x-deflate`.

#[cfg(feature = "decompression")]
mod flate;

use std::{collections::HashMap, fmt, io, sync::Arc};

use bytes::Bytes;
use log::debug;

use crate::{
    error::Http2Error,
    event::FrameEvent,
    frame::{CONTENT_ENCODING, CONTENT_LENGTH, ErrorCode, Headers, StreamId},
};

#[cfg(feature = "decompression")]
pub use self::flate::ContentDecoders;

/// Streaming decoder for one content encoding on one stream.
pub trait Decompressor: Send {
    /// Decode the next chunk of the body.
    ///
    /// # Errors
    ///
    /// Returns an error if `input` is not valid for the encoding.
    fn decompress(&mut self, input: &[u8]) -> io::Result<Bytes>;

    /// Flush whatever the decoder still buffers once the body has ended.
    ///
    /// # Errors
    ///
    /// Returns an error if the body ended in the middle of an encoded block.
    fn finish(&mut self) -> io::Result<Bytes> { Ok(Bytes::new()) }
}

/// Creates decoders for the content encodings a bridge supports.
pub trait DecompressorFactory: Send + Sync + 'static {
    /// Return a decoder for `encoding` (lower-cased, trimmed), or `None` to
    /// leave the stream untouched.
    fn create(&self, encoding: &str) -> Option<Box<dyn Decompressor>>;
}

impl<F> DecompressorFactory for F
where
    F: Fn(&str) -> Option<Box<dyn Decompressor>> + Send + Sync + 'static,
{
    fn create(&self, encoding: &str) -> Option<Box<dyn Decompressor>> { self(encoding) }
}

enum StreamCoding {
    Identity,
    Decoding {
        encoding: String,
        decoder: Box<dyn Decompressor>,
    },
}

/// Per-connection decoding state sitting in front of the connection.
pub struct DecompressingListener {
    factory: Arc<dyn DecompressorFactory>,
    streams: HashMap<StreamId, StreamCoding>,
}

impl fmt::Debug for DecompressingListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecompressingListener")
            .field("streams", &self.streams.len())
            .finish_non_exhaustive()
    }
}

impl DecompressingListener {
    #[must_use]
    pub fn new(factory: Arc<dyn DecompressorFactory>) -> Self {
        Self {
            factory,
            streams: HashMap::new(),
        }
    }

    /// Number of streams with recorded coding state.
    #[must_use]
    pub fn tracked_streams(&self) -> usize { self.streams.len() }

    /// Rewrite `frame` and push the result to `out`.
    ///
    /// Usually one frame goes out per frame in. Trailing `HEADERS` that end a
    /// decoded stream are preceded by a `DATA` frame carrying whatever the
    /// decoder still held.
    ///
    /// # Errors
    ///
    /// Returns a stream-level `PROTOCOL_ERROR` if the body cannot be decoded.
    /// The stream's decoder is discarded.
    pub fn process(
        &mut self,
        frame: FrameEvent,
        out: &mut Vec<FrameEvent>,
    ) -> Result<(), Http2Error> {
        match frame {
            FrameEvent::Headers {
                stream_id,
                mut headers,
                priority,
                padding,
                end_of_stream,
            } => {
                if self.streams.contains_key(&stream_id) {
                    if end_of_stream {
                        self.finish_before_trailers(stream_id, out)?;
                    }
                } else {
                    let coding = self.select(stream_id, &mut headers);
                    if !end_of_stream {
                        self.streams.insert(stream_id, coding);
                    }
                }
                out.push(FrameEvent::Headers {
                    stream_id,
                    headers,
                    priority,
                    padding,
                    end_of_stream,
                });
            }
            FrameEvent::Data {
                stream_id,
                data,
                padding,
                end_of_stream,
                window_bytes,
            } => {
                let data = self.decode(stream_id, &data, end_of_stream)?;
                out.push(FrameEvent::Data {
                    stream_id,
                    data,
                    padding,
                    end_of_stream,
                    window_bytes,
                });
            }
            FrameEvent::RstStream {
                stream_id,
                error_code,
            } => {
                self.streams.remove(&stream_id);
                out.push(FrameEvent::RstStream {
                    stream_id,
                    error_code,
                });
            }
            other => out.push(other),
        }
        Ok(())
    }

    /// Drop any state kept for a closed stream.
    pub fn stream_closed(&mut self, stream_id: StreamId) { self.streams.remove(&stream_id); }

    fn select(&self, stream_id: StreamId, headers: &mut Headers) -> StreamCoding {
        let Some(encoding) = headers
            .get(CONTENT_ENCODING)
            .and_then(|value| std::str::from_utf8(value).ok())
            .map(|value| value.trim().to_ascii_lowercase())
        else {
            return StreamCoding::Identity;
        };
        if encoding == "identity" {
            return StreamCoding::Identity;
        }
        match self.factory.create(&encoding) {
            Some(decoder) => {
                debug!("decoding stream body: stream={stream_id}, encoding={encoding}");
                headers.remove(CONTENT_ENCODING);
                headers.remove(CONTENT_LENGTH);
                StreamCoding::Decoding { encoding, decoder }
            }
            None => StreamCoding::Identity,
        }
    }

    fn decode(
        &mut self,
        stream_id: StreamId,
        data: &Bytes,
        end_of_stream: bool,
    ) -> Result<Bytes, Http2Error> {
        let mut ended = if end_of_stream {
            self.streams.remove(&stream_id)
        } else {
            None
        };
        let coding = match ended.as_mut() {
            Some(coding) => Some(coding),
            None => self.streams.get_mut(&stream_id),
        };
        let Some(StreamCoding::Decoding { encoding, decoder }) = coding else {
            return Ok(data.clone());
        };
        match decode_chunk(&mut **decoder, data, end_of_stream) {
            Ok(decoded) => Ok(decoded),
            Err(err) => {
                let error = decode_error(stream_id, encoding, &err);
                self.streams.remove(&stream_id);
                Err(error)
            }
        }
    }

    fn finish_before_trailers(
        &mut self,
        stream_id: StreamId,
        out: &mut Vec<FrameEvent>,
    ) -> Result<(), Http2Error> {
        let Some(StreamCoding::Decoding {
            encoding,
            mut decoder,
        }) = self.streams.remove(&stream_id)
        else {
            return Ok(());
        };
        let tail = decoder
            .finish()
            .map_err(|err| decode_error(stream_id, &encoding, &err))?;
        if !tail.is_empty() {
            out.push(FrameEvent::Data {
                stream_id,
                data: tail,
                padding: 0,
                end_of_stream: false,
                window_bytes: 0,
            });
        }
        Ok(())
    }
}

fn decode_chunk(decoder: &mut dyn Decompressor, data: &[u8], last: bool) -> io::Result<Bytes> {
    let decoded = decoder.decompress(data)?;
    if !last {
        return Ok(decoded);
    }
    let tail = decoder.finish()?;
    if tail.is_empty() {
        return Ok(decoded);
    }
    let mut joined = Vec::with_capacity(decoded.len() + tail.len());
    joined.extend_from_slice(&decoded);
    joined.extend_from_slice(&tail);
    Ok(Bytes::from(joined))
}

fn decode_error(stream_id: StreamId, encoding: &str, err: &io::Error) -> Http2Error {
    Http2Error::stream(
        stream_id,
        ErrorCode::PROTOCOL_ERROR,
        format!("{encoding} body could not be decoded: {err}"),
    )
}

#[cfg(all(test, not(loom)))]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::test_support::{FAILING_ENCODING, UPPERCASE_ENCODING, test_decompressors};

    #[fixture]
    fn listener() -> DecompressingListener { DecompressingListener::new(Arc::new(test_decompressors)) }

    fn headers_frame(stream: u32, headers: Headers, end_of_stream: bool) -> FrameEvent {
        FrameEvent::Headers {
            stream_id: StreamId::new(stream),
            headers,
            priority: None,
            padding: 0,
            end_of_stream,
        }
    }

    fn data_frame(stream: u32, data: &'static [u8], end_of_stream: bool) -> FrameEvent {
        FrameEvent::Data {
            stream_id: StreamId::new(stream),
            data: Bytes::from_static(data),
            padding: 0,
            end_of_stream,
            window_bytes: u32::try_from(data.len()).expect("small payload"),
        }
    }

    fn run(listener: &mut DecompressingListener, frame: FrameEvent) -> Vec<FrameEvent> {
        let mut out = Vec::new();
        listener.process(frame, &mut out).expect("frame accepted");
        out
    }

    #[rstest]
    fn recognised_encoding_is_stripped_and_decoded(mut listener: DecompressingListener) {
        let headers = Headers::new()
            .with(":status", "200")
            .with("Content-Encoding", UPPERCASE_ENCODING)
            .with("content-length", "5");
        let out = run(&mut listener, headers_frame(1, headers, false));
        let FrameEvent::Headers { headers, .. } = &out[0] else {
            panic!("expected headers, got {out:?}");
        };
        assert!(headers.get(CONTENT_ENCODING).is_none());
        assert!(headers.get(CONTENT_LENGTH).is_none());
        assert_eq!(headers.len(), 1);

        let out = run(&mut listener, data_frame(1, b"hello", true));
        assert_eq!(out, vec![FrameEvent::Data {
            stream_id: StreamId::new(1),
            data: Bytes::from_static(b"HELLO"),
            padding: 0,
            end_of_stream: true,
            window_bytes: 5,
        }]);
        assert_eq!(listener.tracked_streams(), 0);
    }

    #[rstest]
    fn unknown_encoding_passes_through(mut listener: DecompressingListener) {
        let headers = Headers::new().with(CONTENT_ENCODING, "br");
        let out = run(&mut listener, headers_frame(3, headers.clone(), false));
        assert_eq!(out, vec![headers_frame(3, headers, false)]);
        assert_eq!(run(&mut listener, data_frame(3, b"raw", false)), vec![
            data_frame(3, b"raw", false)
        ]);
    }

    #[rstest]
    fn trailers_do_not_restart_decoding(mut listener: DecompressingListener) {
        run(
            &mut listener,
            headers_frame(5, Headers::new().with(CONTENT_ENCODING, UPPERCASE_ENCODING), false),
        );
        run(&mut listener, data_frame(5, b"abc", false));
        let trailers = Headers::new().with(CONTENT_ENCODING, "br");
        let out = run(&mut listener, headers_frame(5, trailers.clone(), true));
        assert_eq!(out, vec![headers_frame(5, trailers, true)]);
        assert_eq!(listener.tracked_streams(), 0);
    }

    #[rstest]
    fn decode_failure_is_a_stream_protocol_error(mut listener: DecompressingListener) {
        run(
            &mut listener,
            headers_frame(7, Headers::new().with(CONTENT_ENCODING, FAILING_ENCODING), false),
        );
        let mut out = Vec::new();
        let err = listener
            .process(data_frame(7, b"zzz", false), &mut out)
            .expect_err("decoding fails");
        assert_eq!(err.stream_id(), Some(StreamId::new(7)));
        assert_eq!(err.code(), ErrorCode::PROTOCOL_ERROR);
        assert!(out.is_empty());
        assert_eq!(listener.tracked_streams(), 0);
    }

    #[rstest]
    fn reset_and_close_drop_stream_state(mut listener: DecompressingListener) {
        let encoded = Headers::new().with(CONTENT_ENCODING, UPPERCASE_ENCODING);
        run(&mut listener, headers_frame(9, encoded.clone(), false));
        run(&mut listener, headers_frame(11, encoded, false));
        assert_eq!(listener.tracked_streams(), 2);

        run(&mut listener, FrameEvent::RstStream {
            stream_id: StreamId::new(9),
            error_code: ErrorCode::CANCEL,
        });
        listener.stream_closed(StreamId::new(11));
        assert_eq!(listener.tracked_streams(), 0);
    }
}
