use anyhow::{Context, Result};
use flate2::bufread::MultiGzDecoder;
use log::trace;
use noodles::bgzf;
use noodles::core::Position;
use noodles::csi::binning_index::index::header::Builder as IndexHeaderBuilder;
use noodles::csi::binning_index::index::reference_sequence::bin::Chunk as IndexChunk;
use noodles::tabix;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Returns whether the path looks like a gzip or bgzip file.
pub fn is_gz<P: AsRef<Path>>(path: P) -> bool {
    [Some(Some("gz")), Some(Some("bgz"))].contains(&path.as_ref().extension().map(|s| s.to_str()))
}

/// Open a plain or (b)gzip-compressed text file for buffered reading.
///
/// Multi-member gzip is decoded transparently, which covers bgzip.
pub fn open_read_maybe_gz<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead + Send>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    if is_gz(path) {
        trace!("Opening {} as gzip for reading", path.display());
        let decoder = MultiGzDecoder::new(BufReader::new(file));
        Ok(Box::new(BufReader::new(decoder)))
    } else {
        trace!("Opening {} as plain text for reading", path.display());
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Tabix index path belonging to a bgzipped VCF.
pub fn index_path_for(vcf_path: &Path) -> PathBuf {
    let mut name = vcf_path.as_os_str().to_owned();
    name.push(".tbi");
    PathBuf::from(name)
}

/// Block-gzip VCF writer that builds a tabix index while records are written.
///
/// Lines are passed through verbatim; the header is copied once at creation.
pub struct BgzfVcfWriter {
    inner: bgzf::Writer<File>,
    indexer: tabix::index::Indexer,
    path: PathBuf,
    records: usize,
}

impl BgzfVcfWriter {
    pub fn create<P: AsRef<Path>>(path: P, header: &[u8]) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .with_context(|| format!("Failed to create VCF output: {}", path.display()))?;
        let mut inner = bgzf::Writer::new(file);
        inner
            .write_all(header)
            .with_context(|| format!("Failed to write VCF header: {}", path.display()))?;

        let mut indexer = tabix::index::Indexer::default();
        indexer.set_header(IndexHeaderBuilder::vcf().build());

        Ok(Self {
            inner,
            indexer,
            path,
            records: 0,
        })
    }

    /// Write one data line (without its trailing newline).
    pub fn write_record(
        &mut self,
        chromosome: &str,
        position: u64,
        reference_len: usize,
        line: &[u8],
    ) -> Result<()> {
        let start_position = self.inner.virtual_position();
        self.inner.write_all(line)?;
        self.inner.write_all(b"\n")?;
        let end_position = self.inner.virtual_position();

        let start = Position::try_from(position as usize)
            .with_context(|| format!("Invalid position {} for index", position))?;
        let end_pos = position as usize + reference_len.max(1) - 1;
        let end = Position::try_from(end_pos)
            .with_context(|| format!("Invalid end position {} for index", end_pos))?;

        self.indexer.add_record(
            chromosome,
            start,
            end,
            IndexChunk::new(start_position, end_position),
        )?;
        self.records += 1;

        Ok(())
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush all blocks, append the empty BGZF EOF block and write the tabix index.
    pub fn finish(self) -> Result<()> {
        let Self {
            inner,
            indexer,
            path,
            records,
        } = self;

        let file = inner
            .finish()
            .with_context(|| format!("Failed to finish bgzip stream: {}", path.display()))?;
        file.sync_all()?;

        let index_path = index_path_for(&path);
        if records == 0 {
            return write_empty_index(&index_path);
        }

        let index = indexer.build();
        let mut writer = File::create(&index_path)
            .map(tabix::io::Writer::new)
            .with_context(|| format!("Failed to create index: {}", index_path.display()))?;
        writer.write_index(&index)?;

        Ok(())
    }

    /// Finish the bgzip stream without writing an index.
    pub fn finish_unindexed(self) -> Result<()> {
        self.inner
            .finish()
            .with_context(|| format!("Failed to finish bgzip stream: {}", self.path.display()))?;
        Ok(())
    }
}

/// Tabix index of a VCF with no data lines: VCF preset, `#` comments,
/// zero reference sequences.
const EMPTY_VCF_INDEX: [u8; 36] = [
    b'T', b'B', b'I', 0x01, // magic
    0, 0, 0, 0, // n_ref
    2, 0, 0, 0, // format: VCF
    1, 0, 0, 0, // col_seq
    2, 0, 0, 0, // col_beg
    0, 0, 0, 0, // col_end
    b'#', 0, 0, 0, // meta
    0, 0, 0, 0, // skip
    0, 0, 0, 0, // l_nm
];

fn write_empty_index(index_path: &Path) -> Result<()> {
    let file = File::create(index_path)
        .with_context(|| format!("Failed to create index: {}", index_path.display()))?;
    let mut writer = bgzf::Writer::new(file);
    writer.write_all(&EMPTY_VCF_INDEX)?;
    writer
        .finish()
        .with_context(|| format!("Failed to finish index: {}", index_path.display()))?;
    Ok(())
}
