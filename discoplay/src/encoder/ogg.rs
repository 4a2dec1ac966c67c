//! Streaming Ogg demuxer for the encoder output.
//!
//! The encoder writes Ogg/Opus to a pipe; every Opus packet is one transport
//! frame. Pages are parsed as they arrive without any seeking:
//! 1. Read the 27-byte page header
//! 2. Read the segment table and page body
//! 3. Optionally validate the CRC32
//! 4. Assemble packets, including packets continued across pages

use std::collections::VecDeque;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::EncodeError;

/// Streaming Ogg packet reader over any async byte source.
pub struct OggPacketReader<R> {
    reader: R,
    current_packet: Vec<u8>,
    queue: VecDeque<Vec<u8>>,
    finished: bool,
    stream_serial: Option<u32>,
    validate_crc: bool,
}

impl<R: AsyncRead + Unpin> OggPacketReader<R> {
    pub fn new(reader: R, validate_crc: bool) -> Self {
        Self {
            reader,
            current_packet: Vec::new(),
            queue: VecDeque::new(),
            finished: false,
            stream_serial: None,
            validate_crc,
        }
    }

    /// Returns the next complete packet, or `None` once the stream has ended.
    pub async fn next_packet(&mut self) -> Result<Option<Vec<u8>>, EncodeError> {
        loop {
            if let Some(packet) = self.queue.pop_front() {
                return Ok(Some(packet));
            }
            if self.finished {
                return Ok(None);
            }
            self.read_page().await?;
        }
    }

    /// Reads exactly `buf.len()` bytes. `Ok(false)` on a clean EOF before
    /// the first byte.
    async fn read_exact_or_eof(&mut self, buf: &mut [u8]) -> Result<bool, EncodeError> {
        let mut offset = 0;
        while offset < buf.len() {
            let n = self.reader.read(&mut buf[offset..]).await?;
            if n == 0 {
                return if offset == 0 {
                    Ok(false)
                } else {
                    Err(EncodeError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "unexpected EOF while reading Ogg page",
                    )))
                };
            }
            offset += n;
        }
        Ok(true)
    }

    async fn read_page(&mut self) -> Result<(), EncodeError> {
        let mut header = [0u8; 27];
        if !self.read_exact_or_eof(&mut header).await? {
            if !self.current_packet.is_empty() {
                return Err(EncodeError::Container(
                    "stream ended inside a packet".into(),
                ));
            }
            self.finished = true;
            return Ok(());
        }

        if &header[0..4] != b"OggS" {
            return Err(EncodeError::Container("invalid Ogg capture pattern".into()));
        }
        if header[4] != 0 {
            return Err(EncodeError::Container("unsupported Ogg version".into()));
        }

        let header_type = header[5];
        let serial = u32::from_le_bytes([header[14], header[15], header[16], header[17]]);
        match self.stream_serial {
            Some(expected) if expected != serial => {
                return Err(EncodeError::Container(
                    "multiple logical streams are not supported".into(),
                ));
            }
            Some(_) => {}
            None => self.stream_serial = Some(serial),
        }

        let page_segments = header[26] as usize;
        let mut segment_table = vec![0u8; page_segments];
        if !self.read_exact_or_eof(&mut segment_table).await? && page_segments > 0 {
            return Err(EncodeError::Container("truncated segment table".into()));
        }

        let data_len: usize = segment_table.iter().map(|&v| v as usize).sum();
        let mut data = vec![0u8; data_len];
        if !self.read_exact_or_eof(&mut data).await? && data_len > 0 {
            return Err(EncodeError::Container("truncated page body".into()));
        }

        if self.validate_crc {
            let expected = u32::from_le_bytes([header[22], header[23], header[24], header[25]]);
            let mut crc_header = header;
            crc_header[22..26].copy_from_slice(&[0, 0, 0, 0]);

            let mut crc = crc::vorbis_crc32_update(0, &crc_header);
            crc = crc::vorbis_crc32_update(crc, &segment_table);
            crc = crc::vorbis_crc32_update(crc, &data);
            if crc != expected {
                return Err(EncodeError::Container(format!(
                    "CRC32 mismatch: expected 0x{expected:08x}, got 0x{crc:08x}"
                )));
            }
        }

        let continued = header_type & 0x01 != 0;
        if continued && self.current_packet.is_empty() {
            return Err(EncodeError::Container(
                "continuation flag without pending packet".into(),
            ));
        }
        if !continued && !self.current_packet.is_empty() {
            return Err(EncodeError::Container(
                "dangling packet without continuation flag".into(),
            ));
        }

        let mut offset = 0usize;
        for &seg_len in &segment_table {
            let end = offset + seg_len as usize;
            self.current_packet.extend_from_slice(&data[offset..end]);
            offset = end;

            // A lacing value below 255 terminates the packet.
            if seg_len < 255 {
                self.queue.push_back(std::mem::take(&mut self.current_packet));
            }
        }

        if header_type & 0x04 != 0 && self.current_packet.is_empty() {
            self.finished = true;
        }

        Ok(())
    }
}

/// CRC32 used by Ogg pages: polynomial 0x04c11db7, initial value 0, no final XOR.
pub(crate) mod crc {
    const fn get_tbl_elem(idx: u32) -> u32 {
        let mut r: u32 = idx << 24;
        let mut i = 0;
        while i < 8 {
            r = (r << 1) ^ (-(((r >> 31) & 1) as i32) as u32 & 0x04c11db7);
            i += 1;
        }
        r
    }

    const fn lookup_array() -> [u32; 0x100] {
        let mut lup_arr: [u32; 0x100] = [0; 0x100];
        let mut i = 0;
        while i < 0x100 {
            lup_arr[i] = get_tbl_elem(i as u32);
            i += 1;
        }
        lup_arr
    }

    static CRC_LOOKUP_ARRAY: &[u32] = &lookup_array();

    pub fn vorbis_crc32_update(cur: u32, array: &[u8]) -> u32 {
        let mut ret: u32 = cur;
        for av in array {
            ret = (ret << 8) ^ CRC_LOOKUP_ARRAY[(*av as u32 ^ (ret >> 24)) as usize];
        }
        ret
    }
}
