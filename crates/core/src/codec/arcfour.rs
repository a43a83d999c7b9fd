//! RC4 stream cipher, used by security handler revisions 2 to 4.

/// RC4 keystream state.
pub struct Arcfour {
    state: [u8; 256],
    i: u8,
    j: u8,
}

impl Arcfour {
    /// Key-scheduling; an empty key behaves like a single zero byte.
    pub fn new(key: &[u8]) -> Self {
        let key: &[u8] = if key.is_empty() { &[0] } else { key };
        let mut state: [u8; 256] = std::array::from_fn(|i| i as u8);
        let mut j: u8 = 0;
        for i in 0..256 {
            j = j.wrapping_add(state[i]).wrapping_add(key[i % key.len()]);
            state.swap(i, j as usize);
        }
        Self { state, i: 0, j: 0 }
    }

    /// Encrypt or decrypt (RC4 is symmetric).
    pub fn process(&mut self, data: &[u8]) -> Vec<u8> {
        data.iter().map(|byte| byte ^ self.next_byte()).collect()
    }

    fn next_byte(&mut self) -> u8 {
        self.i = self.i.wrapping_add(1);
        self.j = self.j.wrapping_add(self.state[self.i as usize]);
        self.state.swap(self.i as usize, self.j as usize);
        let idx = self.state[self.i as usize].wrapping_add(self.state[self.j as usize]);
        self.state[idx as usize]
    }
}

/// One-shot RC4.
pub fn rc4(key: &[u8], data: &[u8]) -> Vec<u8> {
    Arcfour::new(key).process(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rc4_known_vector() {
        assert_eq!(rc4(b"Key", b"Plaintext"), hex::decode("bbf316e8d940af0ad3").unwrap());
    }
}
