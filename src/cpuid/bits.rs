/* cpuid/bits.rs
 *
 * Copyright 2023 Romeo Calota
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 *
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

/// A bit field inside one 32-bit output word.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PackedField {
    offset: u32,
    width: u32,
}

impl PackedField {
    pub const fn new(offset: u32, width: u32) -> Self {
        assert!(width > 0 && offset + width <= 32);
        Self { offset, width }
    }

    pub const fn mask(self) -> u32 {
        if self.width == 32 {
            u32::MAX
        } else {
            (1 << self.width) - 1
        }
    }

    #[inline]
    pub const fn read(self, value: u32) -> u32 {
        (value >> self.offset) & self.mask()
    }

    /// Reads a field stored as `value - 1`. Widened so that an all-ones 32-bit field
    /// decodes to 2^32.
    #[inline]
    pub const fn read_minus_one(self, value: u32) -> u64 {
        self.read(value) as u64 + 1
    }

    #[inline]
    pub const fn is_set(self, value: u32) -> bool {
        self.read(value) != 0
    }
}

/// Mask covering the low `width` bits; widths of 32 and above cover the whole word.
#[inline]
pub const fn low_mask(width: u32) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1 << width) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_masked_and_shifted() {
        let field = PackedField::new(5, 3);
        assert_eq!(field.read(0b1110_0000), 0b111);
        assert_eq!(field.read(0b1_0110_0000), 0b011);
        assert_eq!(field.read(0x1F), 0);
    }

    #[test]
    fn minus_one_encoding() {
        let line_size = PackedField::new(0, 12);
        assert_eq!(line_size.read_minus_one(63), 64);
        assert_eq!(line_size.read_minus_one(0), 1);

        let sets = PackedField::new(0, 32);
        assert_eq!(sets.read_minus_one(4095), 4096);
        assert_eq!(sets.read_minus_one(u32::MAX), 1 << 32);
    }

    #[test]
    fn full_word_field() {
        let field = PackedField::new(0, 32);
        assert_eq!(field.mask(), u32::MAX);
        assert_eq!(field.read(0xDEAD_BEEF), 0xDEAD_BEEF);
    }

    #[test]
    fn single_bit() {
        let turbo = PackedField::new(1, 1);
        assert!(turbo.is_set(0b10));
        assert!(!turbo.is_set(0b01));
    }

    #[test]
    fn low_masks() {
        assert_eq!(low_mask(0), 0);
        assert_eq!(low_mask(3), 0b111);
        assert_eq!(low_mask(32), u32::MAX);
        assert_eq!(low_mask(40), u32::MAX);
    }
}
