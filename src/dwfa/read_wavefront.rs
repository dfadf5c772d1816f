
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum DWFAError {
    #[error("maximum edit distance exceeded")]
    MaxEditDistance,
}

/// Wavefront state for aligning a read against a haplotype.
/// The read (x-axis) must be fully consumed, while any unused tail of the haplotype (y-axis) is free.
/// Both sequences are owned by the caller and passed into every call.
///
/// Wavefront index `i` maps to diagonal `k = i - edit_distance`, where `k` is read bases minus haplotype bases consumed.
/// The stored value is the number of read bases consumed on that diagonal.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReadWavefront {
    /// Current edit distance
    edit_distance: usize,
    /// Furthest read offset per diagonal, length 2*`edit_distance`+1
    wavefront: Vec<usize>,
    /// The alignment gives up beyond this distance
    max_edit_distance: usize
}

impl Default for ReadWavefront {
    fn default() -> Self {
        Self {
            edit_distance: 0,
            wavefront: vec![0],
            max_edit_distance: usize::MAX
        }
    }
}

impl ReadWavefront {
    pub fn with_max_edit_distance(max_edit_distance: usize) -> Self {
        Self {
            max_edit_distance,
            ..Default::default()
        }
    }

    /// Runs the alignment until the read is fully consumed and returns the edit distance.
    /// Calling this again after appending to the read continues from the current state.
    /// # Arguments
    /// * `haplotype` - the haplotype sequence, starting at the read's expected offset
    /// * `read` - the read bases
    /// # Errors
    /// * if the edit distance would exceed the configured maximum
    pub fn align(&mut self, haplotype: &[u8], read: &[u8]) -> Result<usize, DWFAError> {
        self.extend(haplotype, read);
        while !self.read_consumed(read) {
            self.increase_edit_distance(haplotype, read)?;
        }
        Ok(self.edit_distance)
    }

    /// Haplotype offset reached by the diagonal at wavefront index `i`
    fn haplotype_offset(&self, i: usize, read_offset: usize) -> Option<usize> {
        (read_offset + self.edit_distance).checked_sub(i)
    }

    /// Slides every diagonal forward over matching bases
    fn extend(&mut self, haplotype: &[u8], read: &[u8]) {
        for i in 0..self.wavefront.len() {
            loop {
                let read_offset = self.wavefront[i];
                let Some(hap_offset) = self.haplotype_offset(i, read_offset) else {
                    break;
                };
                if read_offset >= read.len() || hap_offset >= haplotype.len() || read[read_offset] != haplotype[hap_offset] {
                    break;
                }
                self.wavefront[i] += 1;
            }
        }
    }

    /// Grows the wavefront by one edit and re-extends it
    fn increase_edit_distance(&mut self, haplotype: &[u8], read: &[u8]) -> Result<(), DWFAError> {
        if self.edit_distance >= self.max_edit_distance {
            return Err(DWFAError::MaxEditDistance);
        }
        self.edit_distance += 1;

        let mut next = vec![0; self.wavefront.len() + 2];
        for (i, &d) in self.wavefront.iter().enumerate() {
            // skipping a haplotype base keeps the read offset
            next[i] = next[i].max(d);
            // substitution
            next[i + 1] = next[i + 1].max(d + 1);
            // extra read base
            next[i + 2] = next[i + 2].max(d + 1);
        }

        // a diagonal cannot consume more read than exists
        for d in next.iter_mut() {
            *d = (*d).min(read.len());
        }
        self.wavefront = next;
        self.extend(haplotype, read);
        Ok(())
    }

    /// Returns true once any diagonal has used every read base
    pub fn read_consumed(&self, read: &[u8]) -> bool {
        self.wavefront.iter().any(|&d| d >= read.len())
    }

    /// Smallest number of haplotype bases used by a diagonal that consumed the full read, if any
    pub fn haplotype_span(&self, read: &[u8]) -> Option<usize> {
        self.wavefront.iter().enumerate()
            .filter(|(_i, &d)| d >= read.len())
            .filter_map(|(i, &d)| self.haplotype_offset(i, d))
            .min()
    }

    // getters
    pub fn edit_distance(&self) -> usize {
        self.edit_distance
    }

    pub fn wavefront(&self) -> &[usize] {
        &self.wavefront
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_prefix() {
        // the haplotype tail is free
        let mut wf = ReadWavefront::default();
        assert_eq!(wf.align(b"ACGTACGTTTTT", b"ACGTACGT").unwrap(), 0);
        assert_eq!(wf.haplotype_span(b"ACGTACGT"), Some(8));
    }

    #[test]
    fn test_empty_read() {
        let mut wf = ReadWavefront::default();
        assert_eq!(wf.align(b"ACGT", b"").unwrap(), 0);
    }

    #[test]
    fn test_mismatch() {
        let mut wf = ReadWavefront::default();
        assert_eq!(wf.align(b"ACGTACGTACGT", b"ACGTACCTACGT").unwrap(), 1);
    }

    #[test]
    fn test_insertion_and_deletion() {
        // read has an extra base
        let mut wf = ReadWavefront::default();
        assert_eq!(wf.align(b"ACGTACGTACGT", b"ACGTAACGTACGT").unwrap(), 1);

        // read is missing two bases
        let mut wf = ReadWavefront::default();
        assert_eq!(wf.align(b"ACGTACGTACGTAAAA", b"ACGTGTACGTAAAA").unwrap(), 2);
    }

    #[test]
    fn test_read_past_haplotype_end() {
        // the overhanging read bases count as insertions
        let mut wf = ReadWavefront::default();
        assert_eq!(wf.align(b"ACGT", b"ACGTTT").unwrap(), 2);
    }

    #[test]
    fn test_incremental() {
        let haplotype = b"ACGTACGTACGT";
        let mut wf = ReadWavefront::default();
        let mut read = vec![];
        for &c in b"ACGTACCT".iter() {
            read.push(c);
            wf.align(haplotype, &read).unwrap();
        }
        assert_eq!(wf.edit_distance(), 1);
    }

    #[test]
    fn test_max_edit_distance() {
        let mut wf = ReadWavefront::with_max_edit_distance(2);
        assert_eq!(wf.align(b"AAAAAAAA", b"CCCCCCCC"), Err(DWFAError::MaxEditDistance));
    }
}
