//! Random-access block index over a pack file.

use std::io::{self, Read, Write};

pub const MAX_BLOCKS: usize = 4096;
pub const MIN_BLOCK_SIZE: u64 = 1024 * 1024;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Block {
    pub off_begin: u64,
    pub off_end: u64,
    pub n_pos: u64,
}

/// On disk: `u64 n_blocks`, then `{off_begin, off_end, n_pos}` per block,
/// all little-endian.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackIndex {
    pub blocks: Vec<Block>,
}

impl PackIndex {
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&(self.blocks.len() as u64).to_le_bytes())?;
        for blk in &self.blocks {
            w.write_all(&blk.off_begin.to_le_bytes())?;
            w.write_all(&blk.off_end.to_le_bytes())?;
            w.write_all(&blk.n_pos.to_le_bytes())?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<PackIndex> {
        let mut buf = [0u8; 8];
        r.read_exact(&mut buf)?;
        let n_blocks = u64::from_le_bytes(buf) as usize;
        if n_blocks > MAX_BLOCKS {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "index block count out of range",
            ));
        }

        let mut blocks = Vec::with_capacity(n_blocks);
        for _ in 0..n_blocks {
            let mut blk = Block::default();
            r.read_exact(&mut buf)?;
            blk.off_begin = u64::from_le_bytes(buf);
            r.read_exact(&mut buf)?;
            blk.off_end = u64::from_le_bytes(buf);
            r.read_exact(&mut buf)?;
            blk.n_pos = u64::from_le_bytes(buf);

            if blk.off_begin > blk.off_end {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "index block offsets are inverted",
                ));
            }
            blocks.push(blk);
        }

        Ok(PackIndex { blocks })
    }

    #[must_use]
    pub fn total_positions(&self) -> u64 {
        self.blocks.iter().map(|b| b.n_pos).sum()
    }
}
