//! Brotli compression of WOFF2 table data.

use super::FontWriter;

/// Reader over a sequence of byte chunks (table contents without padding), which are read
/// as if they were concatenated.
#[derive(Debug)]
struct ChunkedReader<'a> {
    chunks: Vec<&'a [u8]>,
    chunk_idx: usize,
    pos_in_chunk: usize,
}

impl<'a> ChunkedReader<'a> {
    fn new(chunks: Vec<&'a [u8]>) -> Self {
        Self {
            chunks,
            chunk_idx: 0,
            pos_in_chunk: 0,
        }
    }
}

impl brotli::CustomRead<()> for ChunkedReader<'_> {
    fn read(&mut self, data: &mut [u8]) -> Result<usize, ()> {
        let mut total_read = 0;
        while total_read < data.len() {
            let Some(chunk) = self.chunks.get(self.chunk_idx) else {
                break; // nothing left to read
            };
            let remaining = &chunk[self.pos_in_chunk..];
            let read = remaining.len().min(data.len() - total_read);
            data[total_read..total_read + read].copy_from_slice(&remaining[..read]);
            total_read += read;
            self.pos_in_chunk += read;

            if self.pos_in_chunk == chunk.len() {
                self.chunk_idx += 1;
                self.pos_in_chunk = 0;
            }
        }
        Ok(total_read)
    }
}

#[derive(Default)]
struct Buffer(Vec<u8>);

impl brotli::CustomWrite<()> for Buffer {
    fn write(&mut self, data: &[u8]) -> Result<usize, ()> {
        self.0.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct BoxedSlice<T>(Box<[T]>);

impl<T> Default for BoxedSlice<T> {
    fn default() -> Self {
        Self(Box::default())
    }
}

impl<T> brotli::SliceWrapper<T> for BoxedSlice<T> {
    fn slice(&self) -> &[T] {
        self.0.as_ref()
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

impl<T> brotli::SliceWrapperMut<T> for BoxedSlice<T> {
    fn slice_mut(&mut self) -> &mut [T] {
        self.0.as_mut()
    }
}

#[derive(Debug)]
struct GlobalAlloc;

impl<T: Clone + Default> brotli::enc::Allocator<T> for GlobalAlloc {
    type AllocatedMemory = BoxedSlice<T>;

    fn alloc_cell(&mut self, len: usize) -> Self::AllocatedMemory {
        BoxedSlice(vec![T::default(); len].into())
    }

    fn free_cell(&mut self, data: Self::AllocatedMemory) {
        drop(data);
    }
}

impl brotli::enc::BrotliAlloc for GlobalAlloc {}

impl FontWriter {
    /// Returns table contents without padding in the order of table records.
    /// Must be called after table offsets are adjusted to include the data offset.
    fn table_chunks(&self) -> Vec<&[u8]> {
        let data_offset = self.tables.first().map_or(0, |record| record.offset) as usize;
        self.tables
            .iter()
            .map(|record| {
                let start = record.offset as usize - data_offset;
                &self.table_data[start..start + record.length as usize]
            })
            .collect()
    }

    pub(super) fn compress_data(&self) -> Vec<u8> {
        let mut buffer = Buffer::default();
        ::brotli::BrotliCompressCustomIo(
            &mut ChunkedReader::new(self.table_chunks()),
            &mut buffer,
            &mut [0_u8; 4_096],
            &mut [0_u8; 4_096],
            &::brotli::enc::BrotliEncoderParams::default(),
            GlobalAlloc,
            &mut |_, _, _, _| { /* do nothing */ },
            (),
        )
        .expect("Writing to Vec never fails");

        buffer.0
    }
}

#[cfg(test)]
mod tests {
    use brotli::CustomRead;
    use test_casing::test_casing;

    use super::*;
    use crate::{tests::LIGHT_FONT, Font, SubsetOptions};

    #[test]
    fn chunked_reader_skips_empty_chunks() {
        let mut reader = ChunkedReader::new(vec![&b"ab"[..], &b""[..], &b"cde"[..], &b""[..]]);
        let mut buffer = [0; 4];
        assert_eq!(reader.read(&mut buffer).unwrap(), 4);
        assert_eq!(buffer, *b"abcd");
        assert_eq!(reader.read(&mut buffer).unwrap(), 1);
        assert_eq!(buffer[0], b'e');
        assert_eq!(reader.read(&mut buffer).unwrap(), 0);
    }

    #[test_casing(5, [1, 10, 100, 1000, 100_000])]
    fn chunked_reader_works_as_expected(chunk_size: usize) {
        let font = Font::new(LIGHT_FONT.bytes).unwrap();
        let chars = (' '..='~').collect();
        let subset = font.subset(&chars, &SubsetOptions::default()).unwrap();
        let mut writer = subset.to_writer();
        writer.adjust_data(0);

        let chunks = writer.table_chunks();
        let expected: Vec<u8> = chunks.concat();
        let mut data_reader = ChunkedReader::new(chunks);
        let mut buffer = vec![0; expected.len() + 100_000];

        let read = buffer
            .chunks_mut(chunk_size)
            .map(|chunk| data_reader.read(chunk).unwrap())
            .sum::<usize>();
        assert_eq!(read, expected.len());
        assert_eq!(buffer[..read], expected[..]);
    }
}
