/*!
# DWFA module
Contains a dynamic WaveFront alignment that measures the edit distance of a read against a candidate haplotype.
The read must be consumed end-to-end, while the haplotype may extend past the read.
This is the shape of the problem when many short reads are compared against one haplotype window.

## Example usage
```rust
use trioshard::dwfa::read_wavefront::ReadWavefront;

let mut wf = ReadWavefront::default();
// one mismatch, the trailing haplotype bases are ignored
assert_eq!(wf.align(b"ACGTACGTTT", b"ACCTACGT").unwrap(), 1);
```
*/
/// Read-versus-haplotype wavefront, with a free haplotype tail
pub mod read_wavefront;
