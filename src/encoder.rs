use std::io::{BufWriter, Write};

use bytes::{BufMut, Bytes, BytesMut};
use flate2::write::GzEncoder;
use serde::Serialize;

use crate::error::EncodeError;
use crate::grouper::Stream;

const BUFFER_SIZE: usize = 1024;
const GZIP_INPUT_BUFFER_CAPACITY: usize = 4_096;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Compression {
    None,
    #[default]
    Gzip,
}

impl Compression {
    pub const fn content_encoding(&self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            Compression::Gzip => Some("gzip"),
        }
    }
}

impl From<bool> for Compression {
    fn from(gzip: bool) -> Self {
        if gzip {
            Compression::Gzip
        } else {
            Compression::None
        }
    }
}

/// A ready to send request body.
#[derive(Clone, Debug)]
pub struct EncodedPayload {
    pub body: Bytes,
    pub content_encoding: Option<&'static str>,
}

// This struct is PushRequest
// https://github.com/grafana/loki/blob/main/pkg/logproto/logproto.proto#L29
#[derive(Serialize)]
struct PushRequest<'a> {
    streams: &'a [Stream],
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PayloadEncoder {
    compression: Compression,
}

impl PayloadEncoder {
    pub const fn new(compression: Compression) -> Self {
        Self { compression }
    }

    pub const fn compression(&self) -> Compression {
        self.compression
    }

    pub fn encode(&self, streams: &[Stream]) -> Result<EncodedPayload, EncodeError> {
        let request = PushRequest { streams };
        let writer = BytesMut::with_capacity(BUFFER_SIZE).writer();

        let body = match self.compression {
            Compression::None => {
                let mut writer = writer;
                serde_json::to_writer(&mut writer, &request)?;
                writer.into_inner()
            }
            Compression::Gzip => {
                // Buffering writes to the underlying Encoder writer
                // to avoid Vec-trashing and expensive memset syscalls.
                let mut writer = BufWriter::with_capacity(
                    GZIP_INPUT_BUFFER_CAPACITY,
                    GzEncoder::new(writer, flate2::Compression::default()),
                );
                serde_json::to_writer(&mut writer, &request)?;
                writer.flush()?;

                let encoder = writer.into_inner().map_err(|err| err.into_error())?;
                encoder.finish()?.into_inner()
            }
        };

        Ok(EncodedPayload {
            body: body.freeze(),
            content_encoding: self.compression.content_encoding(),
        })
    }
}
