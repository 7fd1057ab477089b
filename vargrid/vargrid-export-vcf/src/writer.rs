//! Writers for VCF output with compression support
//!
//! Provides writers for VCF text with support for:
//! - Uncompressed (plain) VCF
//! - GZIP compression
//! - BGZF compression (block-gzipped, allows random access)

use flate2::write::GzEncoder;
use flate2::Compression;
use noodles_bgzf as bgzf;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use vargrid_core::Result;

/// Compression type for VCF output files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VcfCompressionType {
    /// No compression (plain text VCF).
    #[default]
    Plain,
    /// Standard GZIP compression.
    Gzip,
    /// BGZF compression (block-gzipped, allows random access).
    Bgzf,
}

impl VcfCompressionType {
    /// Determines the compression type from a file extension:
    /// `.bgz`/`.bgzf` → BGZF, `.gz` → GZIP, otherwise plain.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        let path_str = path.as_ref().to_string_lossy().to_lowercase();
        if path_str.ends_with(".bgz") || path_str.ends_with(".bgzf") {
            VcfCompressionType::Bgzf
        } else if path_str.ends_with(".gz") {
            VcfCompressionType::Gzip
        } else {
            VcfCompressionType::Plain
        }
    }

    /// Determines the compression type from an explicit format string
    /// (`"z"` gzip, `"bz"` BGZF), falling back to the file extension when
    /// the string is empty.
    pub fn from_format(format: &str, path: &Path) -> Self {
        match format {
            "z" => VcfCompressionType::Gzip,
            "bz" => VcfCompressionType::Bgzf,
            "" => VcfCompressionType::from_path(path),
            _ => VcfCompressionType::Plain,
        }
    }
}

/// A unified writer for VCF output regardless of compression format.
pub enum VcfLocalWriter {
    /// Writer for uncompressed VCF files.
    Plain(BufWriter<File>),
    /// Writer for GZIP-compressed VCF files.
    Gzip(GzEncoder<BufWriter<File>>),
    /// Writer for BGZF-compressed VCF files.
    Bgzf(bgzf::Writer<BufWriter<File>>),
}

impl VcfLocalWriter {
    /// Creates a writer with compression detected from the file extension.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let compression = VcfCompressionType::from_path(&path);
        Self::with_compression(path, compression)
    }

    /// Creates a writer with an explicit compression type.
    ///
    /// # Errors
    ///
    /// `Io` when the output file cannot be created.
    pub fn with_compression<P: AsRef<Path>>(
        path: P,
        compression: VcfCompressionType,
    ) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        let buf_writer = BufWriter::new(file);
        Ok(match compression {
            VcfCompressionType::Plain => VcfLocalWriter::Plain(buf_writer),
            VcfCompressionType::Gzip => {
                VcfLocalWriter::Gzip(GzEncoder::new(buf_writer, Compression::default()))
            }
            VcfCompressionType::Bgzf => VcfLocalWriter::Bgzf(bgzf::Writer::new(buf_writer)),
        })
    }

    /// Writes one record line, appending the newline.
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        match self {
            VcfLocalWriter::Plain(w) => {
                w.write_all(line.as_bytes())?;
                w.write_all(b"\n")?;
            }
            VcfLocalWriter::Gzip(w) => {
                w.write_all(line.as_bytes())?;
                w.write_all(b"\n")?;
            }
            VcfLocalWriter::Bgzf(w) => {
                w.write_all(line.as_bytes())?;
                w.write_all(b"\n")?;
            }
        }
        Ok(())
    }

    /// Flushes and finalizes the output stream.
    pub fn finish(self) -> Result<()> {
        match self {
            VcfLocalWriter::Plain(mut w) => {
                w.flush()?;
            }
            VcfLocalWriter::Gzip(w) => {
                let mut inner = w.finish()?;
                inner.flush()?;
            }
            VcfLocalWriter::Bgzf(w) => {
                let mut inner = w.finish()?;
                inner.flush()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_from_path() {
        assert_eq!(
            VcfCompressionType::from_path("out.vcf"),
            VcfCompressionType::Plain
        );
        assert_eq!(
            VcfCompressionType::from_path("out.vcf.gz"),
            VcfCompressionType::Gzip
        );
        assert_eq!(
            VcfCompressionType::from_path("out.vcf.bgz"),
            VcfCompressionType::Bgzf
        );
    }

    #[test]
    fn test_compression_from_format() {
        let path = Path::new("out.vcf");
        assert_eq!(
            VcfCompressionType::from_format("z", path),
            VcfCompressionType::Gzip
        );
        assert_eq!(
            VcfCompressionType::from_format("bz", path),
            VcfCompressionType::Bgzf
        );
        assert_eq!(
            VcfCompressionType::from_format("", Path::new("out.vcf.gz")),
            VcfCompressionType::Gzip
        );
    }
}
