use std::path::Path;

use anyhow::Context;
use r_htslib::*;

use crate::{diag::Diagnostics, error::MetaSiteError};

/// Source of per-base read depth for a genomic interval
///
/// get_depth returns one or more channels for the half-open interval [start, end).
/// Every channel has length end - start; the channels partition the depth into
/// categories that callers may sum.
pub trait DepthSource {
    fn get_depth(&mut self, contig: &str, start: i64, end: i64) -> anyhow::Result<Vec<Vec<u32>>>;
}

// Reads with any of these flags are not counted
const FORBID_FLAGS: u16 = BAM_FUNMAP | BAM_FSECONDARY | BAM_FQCFAIL | BAM_FDUP;

const FORWARD: usize = 0;
const REVERSE: usize = 1;

#[derive(Debug, Clone, Copy)]
pub struct ReadFilter {
    min_mapq: u8,
    min_qual: u8,
}

impl ReadFilter {
    pub fn new(min_mapq: u8, min_qual: u8) -> Self {
        Self { min_mapq, min_qual }
    }

    fn pass_filter(&self, flag: u16, mapq: u8) -> bool {
        (flag & FORBID_FLAGS) == 0 && mapq >= self.min_mapq
    }
}

/// Alignment operation of a read, reduced to how it moves along the read and
/// the reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignOp {
    /// M, = or X: one read base against one reference base
    Aligned(u32),
    /// I or S: read bases with no reference position
    ReadOnly(u32),
    /// D or N: reference bases with no read base
    RefOnly(u32),
    /// H or P
    Skip,
}

/// Convert the CIGAR of a record into AlignOps
fn align_ops(rec: &BamRec) -> Option<Vec<AlignOp>> {
    rec.cigar().map(|cigar| {
        cigar
            .iter()
            .map(|elem| {
                let l = elem.op_len();
                match elem.op() {
                    CigarOp::Match | CigarOp::Equal | CigarOp::Diff => AlignOp::Aligned(l),
                    CigarOp::Ins | CigarOp::SoftClip => AlignOp::ReadOnly(l),
                    CigarOp::Del | CigarOp::RefSkip => AlignOp::RefOnly(l),
                    _ => AlignOp::Skip,
                }
            })
            .collect()
    })
}

/// Part of [start, end) that lies on a contig of length seq_len
/// Returns None if there is no overlap
fn clamp_interval(start: i64, end: i64, seq_len: usize) -> Option<(usize, usize)> {
    let lo = start.max(0);
    let hi = end.min(seq_len as i64);
    if hi > lo {
        Some((lo as usize, hi as usize))
    } else {
        None
    }
}

/// htslib region string for the 0-based half-open interval [lo, hi)
/// Contig names containing ':' are put in braces so the range can be parsed
fn region_string(contig: &str, lo: usize, hi: usize) -> String {
    if contig.contains(':') {
        format!("{{{}}}:{}-{}", contig, lo + 1, hi)
    } else {
        format!("{}:{}-{}", contig, lo + 1, hi)
    }
}

/// Count the aligned bases of a read into cov, where cov[0] is at reference position
/// win_start (which may be negative).  The read is placed from read_start following
/// ops; only aligned bases with quality >= min_qual are counted.  Deleted and skipped
/// reference bases are not counted
fn add_read_bases(
    cov: &mut [u32],
    win_start: i64,
    read_start: usize,
    ops: &[AlignOp],
    qual: &[u8],
    min_qual: u8,
) {
    let win_end = win_start + cov.len() as i64;
    let mut x = read_start as i64;
    let mut qpos = 0;
    for op in ops.iter() {
        if x >= win_end {
            break;
        }
        match *op {
            AlignOp::Aligned(l) => {
                for _ in 0..l {
                    if x >= win_start && x < win_end {
                        if let Some(q) = qual.get(qpos) {
                            if *q >= min_qual {
                                cov[(x - win_start) as usize] += 1
                            }
                        }
                    }
                    x += 1;
                    qpos += 1;
                }
            }
            AlignOp::ReadOnly(l) => qpos += l as usize,
            AlignOp::RefOnly(l) => x += l as i64,
            AlignOp::Skip => (),
        }
    }
}

/// Depth source backed by an indexed SAM/BAM/CRAM file
///
/// Positions off either end of the contig are reported with zero depth.
/// Depth is split into two channels: reads on the forward strand and reads on the
/// reverse strand
pub struct HtsDepth {
    hts: Hts,
    filter: ReadFilter,
}

impl HtsDepth {
    pub fn open<P: AsRef<Path>>(
        name: P,
        reference: Option<&Path>,
        filter: ReadFilter,
        diag: &dyn Diagnostics,
    ) -> anyhow::Result<Self> {
        let name = name.as_ref();
        diag.debug(format_args!(
            "Try to open input file {} with reference {:?}",
            name.display(),
            reference
        ));

        // Set up htsFormat so we can add the reference
        let mut fmt = HtsFormat::default();
        if let Some(r) = reference {
            fmt.opt_add(format!("reference={}", r.display()))?;
        }

        let mut hts = Hts::open_format(name, "r", &fmt)
            .with_context(|| format!("Failed to open input file {}", name.display()))?;

        // Check that this is a SAM type file (SAM/BAM/CRAM)
        if !matches!(hts.rec_type(), Some(HtsRecType::Sam)) {
            Err(anyhow!(
                "Incorrect file format for input file {}",
                name.display()
            ))
        } else {
            hts.index_load()
                .with_context(|| format!("Index not found for input file {}", name.display()))?;
            Ok(Self { hts, filter })
        }
    }
}

impl DepthSource for HtsDepth {
    fn get_depth(&mut self, contig: &str, start: i64, end: i64) -> anyhow::Result<Vec<Vec<u32>>> {
        let width = (end - start).max(0) as usize;
        let mut cov = vec![vec![0u32; width]; 2];

        let seq_len = self
            .hts
            .seq_length(contig)
            .ok_or_else(|| MetaSiteError::UnknownContig(contig.to_owned()))?;

        let (lo, hi) = match clamp_interval(start, end, seq_len) {
            Some(x) => x,
            None => return Ok(cov),
        };

        let region = region_string(contig, lo, hi);
        let rlist = self.hts.make_region_list(&[region.as_str()]);
        let mut rdr: HtsItrReader<BamRec> = self.hts.itr_reader(&rlist);
        let mut rec = BamRec::new()?;

        while rdr.read(&mut rec)? {
            if !self.filter.pass_filter(rec.flag(), rec.qual()) {
                continue;
            }
            if let (Some(x), Some(qv), Some(ops)) = (rec.pos(), rec.get_qual(), align_ops(&rec)) {
                let ch = if (rec.flag() & BAM_FREVERSE) == 0 {
                    FORWARD
                } else {
                    REVERSE
                };
                add_read_bases(&mut cov[ch], start, x, &ops, qv, self.filter.min_qual);
            }
        }
        Ok(cov)
    }
}

#[cfg(test)]
pub mod testing {
    use std::collections::HashMap;

    use super::*;

    /// In-memory depth source.  Contigs not given explicit depths have constant
    /// depth `fill` over `len` bases; outside the contig depth is zero
    pub struct MockDepth {
        fill: u32,
        len: usize,
        contigs: HashMap<String, Vec<u32>>,
        pub requests: Vec<(String, i64, i64)>,
    }

    impl MockDepth {
        pub fn constant(fill: u32, len: usize) -> Self {
            Self {
                fill,
                len,
                contigs: HashMap::new(),
                requests: Vec::new(),
            }
        }

        pub fn with_contig(mut self, name: &str, depth: Vec<u32>) -> Self {
            self.contigs.insert(name.to_owned(), depth);
            self
        }

        fn depth_at(&self, contig: &str, x: i64) -> u32 {
            if x < 0 {
                return 0;
            }
            match self.contigs.get(contig) {
                Some(v) => v.get(x as usize).copied().unwrap_or(0),
                None if (x as usize) < self.len => self.fill,
                None => 0,
            }
        }
    }

    impl DepthSource for MockDepth {
        fn get_depth(
            &mut self,
            contig: &str,
            start: i64,
            end: i64,
        ) -> anyhow::Result<Vec<Vec<u32>>> {
            self.requests.push((contig.to_owned(), start, end));
            // Split depth over two channels so callers must sum them
            let (a, b): (Vec<_>, Vec<_>) = (start..end)
                .map(|x| {
                    let d = self.depth_at(contig, x);
                    (d / 2, d - d / 2)
                })
                .unzip();
            Ok(vec![a, b])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::testing::RecordingSink;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use AlignOp::*;

    #[rstest]
    #[case(10, 20, 100, Some((10, 20)))]
    #[case(-5, 5, 100, Some((0, 5)))]
    #[case(95, 105, 100, Some((95, 100)))]
    #[case(-10, 0, 100, None)]
    #[case(100, 110, 100, None)]
    fn test_clamp_interval(
        #[case] start: i64,
        #[case] end: i64,
        #[case] seq_len: usize,
        #[case] exp: Option<(usize, usize)>,
    ) {
        assert_eq!(clamp_interval(start, end, seq_len), exp);
    }

    #[rstest]
    #[case("chr1", 94, 104, "chr1:95-104")]
    #[case("HLA-A*01:01:01:01", 0, 10, "{HLA-A*01:01:01:01}:1-10")]
    fn test_region_string(
        #[case] contig: &str,
        #[case] lo: usize,
        #[case] hi: usize,
        #[case] exp: &str,
    ) {
        assert_eq!(region_string(contig, lo, hi), exp);
    }

    #[rstest]
    fn test_add_read_bases_matches() {
        // Window [10, 15), read 5M at 8
        let mut cov = vec![0; 5];
        add_read_bases(&mut cov, 10, 8, &[Aligned(5)], &[30; 5], 15);
        assert_eq!(cov, vec![1, 1, 1, 0, 0]);

        // Low quality base at position 11 is skipped
        add_read_bases(&mut cov, 10, 10, &[Aligned(5)], &[30, 2, 30, 30, 30], 15);
        assert_eq!(cov, vec![2, 1, 2, 1, 1]);

        // Read extends past the window
        add_read_bases(&mut cov, 10, 13, &[Aligned(8)], &[40; 8], 15);
        assert_eq!(cov, vec![2, 1, 2, 2, 2]);
    }

    #[rstest]
    fn test_add_read_bases_deletion() {
        // 5M3D5M at 10, window [10, 25)
        let mut cov = vec![0; 15];
        add_read_bases(
            &mut cov,
            10,
            10,
            &[Aligned(5), RefOnly(3), Aligned(5)],
            &[30; 10],
            15,
        );
        assert_eq!(cov, vec![1, 1, 1, 1, 1, 0, 0, 0, 1, 1, 1, 1, 1, 0, 0]);
    }

    #[rstest]
    fn test_add_read_bases_soft_clip() {
        // 4S6M at 10 with low quality clipped bases, window [10, 18)
        let mut qual = vec![2; 4];
        qual.extend_from_slice(&[30; 6]);
        let mut cov = vec![0; 8];
        add_read_bases(&mut cov, 10, 10, &[ReadOnly(4), Aligned(6)], &qual, 15);
        assert_eq!(cov, vec![1, 1, 1, 1, 1, 1, 0, 0]);
    }

    #[rstest]
    fn test_add_read_bases_splice_and_insertion() {
        // 3M4N3M at 10, window [10, 22)
        let mut cov = vec![0; 12];
        add_read_bases(
            &mut cov,
            10,
            10,
            &[Aligned(3), RefOnly(4), Aligned(3)],
            &[30; 6],
            15,
        );
        assert_eq!(cov, vec![1, 1, 1, 0, 0, 0, 0, 1, 1, 1, 0, 0]);

        // 2H3M2I3M at 10: inserted bases take no reference position; the low quality
        // base after the insertion is skipped
        let mut cov = vec![0; 8];
        add_read_bases(
            &mut cov,
            10,
            10,
            &[Skip, Aligned(3), ReadOnly(2), Aligned(3)],
            &[30, 30, 30, 2, 2, 2, 30, 30],
            15,
        );
        assert_eq!(cov, vec![1, 1, 1, 0, 1, 1, 0, 0]);
    }

    #[rstest]
    fn test_add_read_bases_window_before_contig_start() {
        // Window [-3, 7) as requested for a site near position 0; read 4M at 0
        let mut cov = vec![0; 10];
        add_read_bases(&mut cov, -3, 0, &[Aligned(4)], &[30; 4], 15);
        assert_eq!(cov, vec![0, 0, 0, 1, 1, 1, 1, 0, 0, 0]);
    }

    #[rstest]
    fn test_read_filter() {
        let f = ReadFilter::new(20, 15);
        assert!(f.pass_filter(0, 20));
        assert!(f.pass_filter(BAM_FREVERSE, 60));
        assert!(!f.pass_filter(0, 19));
        assert!(!f.pass_filter(BAM_FDUP, 60));
        assert!(!f.pass_filter(BAM_FUNMAP | BAM_FREVERSE, 60));
    }

    #[rstest]
    fn test_open_reports_through_sink() {
        let sink = RecordingSink::default();
        let r = HtsDepth::open(
            "/no/such/input.bam",
            None,
            ReadFilter::new(0, 15),
            &sink,
        );
        assert!(r.is_err());
        assert_eq!(sink.messages_at(log::Level::Debug).len(), 1);
    }
}
