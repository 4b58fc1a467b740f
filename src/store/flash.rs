//! Cell storage on a sector of NOR flash.
//!
//! NOR flash can only be erased a sector at a time, so cells live in a RAM mirror and
//! [`CellStorage::flush`] rewrites the whole sector when something changed.

use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};

use super::{CellStorage, ERASED_CELL, TOTAL_CELLS};

/// Bytes written per flush: the cells, rounded up to a 256-byte flash page.
const IMAGE_LEN: usize = (TOTAL_CELLS * 2).div_ceil(256) * 256;

#[derive(Debug, PartialEq, Eq)]
pub enum Error<E> {
    Flash(E),
    /// The store offset is not on a sector boundary.
    Misaligned,
    OutOfBounds(usize),
}

impl<E> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::Flash(e)
    }
}

pub struct FlashCells<F> {
    flash: F,
    /// Start of the sector reserved for the store.
    offset: u32,
    mirror: [u16; TOTAL_CELLS],
    dirty: bool,
}

impl<F: NorFlash + ReadNorFlash> FlashCells<F> {
    /// Use the sector at `offset` and read its current contents.
    pub fn new(mut flash: F, offset: u32) -> Result<Self, Error<F::Error>> {
        if offset as usize % F::ERASE_SIZE != 0 || IMAGE_LEN > F::ERASE_SIZE {
            return Err(Error::Misaligned);
        }
        let mut image = [0u8; IMAGE_LEN];
        flash.read(offset, &mut image)?;
        let mut mirror = [ERASED_CELL; TOTAL_CELLS];
        for (cell, pair) in mirror.iter_mut().zip(image.chunks_exact(2)) {
            *cell = u16::from_le_bytes([pair[0], pair[1]]);
        }
        Ok(FlashCells {
            flash,
            offset,
            mirror,
            dirty: false,
        })
    }

    fn erase_sector(&mut self) -> Result<(), Error<F::Error>> {
        self.flash
            .erase(self.offset, self.offset + F::ERASE_SIZE as u32)?;
        Ok(())
    }

    pub fn release(self) -> F {
        self.flash
    }
}

impl<F: NorFlash + ReadNorFlash> CellStorage for FlashCells<F> {
    type Error = Error<F::Error>;

    fn read_cell(&mut self, index: usize) -> Result<u16, Self::Error> {
        self.mirror
            .get(index)
            .copied()
            .ok_or(Error::OutOfBounds(index))
    }

    fn update_cell(&mut self, index: usize, value: u16) -> Result<(), Self::Error> {
        let cell = self.mirror.get_mut(index).ok_or(Error::OutOfBounds(index))?;
        if *cell != value {
            *cell = value;
            self.dirty = true;
        }
        Ok(())
    }

    fn erase(&mut self) -> Result<(), Self::Error> {
        self.mirror = [ERASED_CELL; TOTAL_CELLS];
        self.dirty = false;
        self.erase_sector()
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if !self.dirty {
            return Ok(());
        }
        let mut image = [0xffu8; IMAGE_LEN];
        for (pair, cell) in image.chunks_exact_mut(2).zip(self.mirror) {
            pair.copy_from_slice(&cell.to_le_bytes());
        }
        log::debug!("flash: rewriting sector at {:#x}", self.offset);
        self.erase_sector()?;
        self.flash.write(self.offset, &image)?;
        self.dirty = false;
        Ok(())
    }
}
