//! Delimited ASCII X/Y/Z points.
//!
//! One point per line, columns separated by whitespace or commas. Lines
//! starting with `#` are comments. Columns past the third are ignored.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memchr::{memchr, memchr3};
use memmap2::Mmap;

use crate::buffer::PointBuffer;
use crate::config::{DEFAULT_OUTPUT_BUFFER, MMAP_THRESHOLD};
use crate::dimension::{DataType, DimensionId};
use crate::error::{ErrorSink, LogErrorSink, PipelineError, Result, Severity};
use crate::layout::SchemaLayout;
use crate::options::Options;
use crate::schema::Schema;
use crate::stage::{
    check_buffer_schema, PointSink, PointSource, Stage, StageBase, StageIterator, StageKind,
    StageState,
};

/// Bytes of the input, mapped or read in full.
enum TextData {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl TextData {
    fn load(path: &Path) -> Result<Self> {
        let mut file = File::open(path).map_err(|e| {
            PipelineError::ConnectionFailed(format!("cannot open {}: {}", path.display(), e))
        })?;
        let len = file.metadata()?.len();
        if len >= MMAP_THRESHOLD {
            // SAFETY: the map is read-only and lives as long as the reader.
            let mmap = unsafe { Mmap::map(&file)? };
            Ok(TextData::Mapped(mmap))
        } else {
            let mut bytes = Vec::with_capacity(len as usize);
            file.read_to_end(&mut bytes)?;
            Ok(TextData::Owned(bytes))
        }
    }

    #[inline]
    fn as_bytes(&self) -> &[u8] {
        match self {
            TextData::Mapped(m) => m,
            TextData::Owned(v) => v,
        }
    }
}

#[inline]
fn is_separator(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b',')
}

/// Parse the first three numeric columns of a line.
fn parse_xyz(line: &[u8]) -> Option<[f64; 3]> {
    let mut out = [0.0; 3];
    let mut rest = line;
    for slot in out.iter_mut() {
        let start = rest.iter().position(|&b| !is_separator(b))?;
        rest = &rest[start..];
        let end = memchr3(b' ', b'\t', b',', rest).unwrap_or(rest.len());
        *slot = std::str::from_utf8(&rest[..end]).ok()?.parse().ok()?;
        rest = &rest[end..];
    }
    Some(out)
}

/// Reads X/Y/Z as f64 from a text file or an in-memory byte string.
///
/// Malformed lines are a parse error. In lenient mode they are reported to
/// the error sink and skipped instead.
pub struct TextReader {
    base: StageBase,
    data: Option<TextData>,
    errors: Arc<dyn ErrorSink>,
    lenient: bool,
}

impl TextReader {
    /// Options: `filename` (required), `lenient` (default false).
    pub fn new(options: Options) -> Self {
        Self {
            base: StageBase::new(options),
            data: None,
            errors: Arc::new(LogErrorSink),
            lenient: false,
        }
    }

    /// Read from `bytes` instead of a file. `filename` is not needed.
    pub fn from_bytes(bytes: Vec<u8>, options: Options) -> Self {
        Self {
            data: Some(TextData::Owned(bytes)),
            ..Self::new(options)
        }
    }

    /// Send lenient-mode reports to `sink` instead of the log.
    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.errors = sink;
        self
    }

    /// Whether the input is memory-mapped.
    pub fn is_mapped(&self) -> bool {
        matches!(self.data, Some(TextData::Mapped(_)))
    }

    fn bytes(&self) -> &[u8] {
        self.data.as_ref().map(TextData::as_bytes).unwrap_or(&[])
    }
}

impl Stage for TextReader {
    fn name(&self) -> &'static str {
        "readers.text"
    }

    fn kind(&self) -> StageKind {
        StageKind::Reader
    }

    fn base(&self) -> &StageBase {
        &self.base
    }

    fn default_options(&self) -> Options {
        let mut options = Options::new();
        options.add("lenient", false, "skip malformed lines instead of failing");
        options
    }

    fn initialize(&mut self) -> Result<()> {
        if self.base.is_initialized() {
            return Ok(());
        }
        let options = self.resolved_options();
        self.lenient = options.value("lenient")?;
        if self.data.is_none() {
            let path: PathBuf = options.value("filename")?;
            let data = TextData::load(&path)?;
            log::debug!(
                "{}: loaded {} bytes from {}{}",
                self.name(),
                data.as_bytes().len(),
                path.display(),
                if matches!(data, TextData::Mapped(_)) { " (mmap)" } else { "" }
            );
            self.data = Some(data);
        }

        self.base.set_schema(Schema::from_ids(&[
            DimensionId::XF64,
            DimensionId::YF64,
            DimensionId::ZF64,
        ])?);
        self.base.set_state(StageState::Initialized);
        Ok(())
    }
}

impl PointSource for TextReader {
    fn create_sequential_iterator(&self) -> Result<Box<dyn StageIterator + '_>> {
        self.base.ensure_initialized(self.name())?;
        Ok(Box::new(TextIterator {
            reader: self,
            data: self.bytes(),
            pos: 0,
            line: 0,
            index: 0,
        }))
    }
}

struct TextIterator<'a> {
    reader: &'a TextReader,
    data: &'a [u8],
    pos: usize,
    line: usize,
    index: u64,
}

impl TextIterator<'_> {
    fn next_point(&mut self) -> Result<Option<[f64; 3]>> {
        while self.pos < self.data.len() {
            let rest = &self.data[self.pos..];
            let end = memchr(b'\n', rest).unwrap_or(rest.len());
            let mut line = &rest[..end];
            self.pos += end + 1;
            self.line += 1;

            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            let Some(start) = line.iter().position(|b| !b.is_ascii_whitespace()) else {
                continue;
            };
            let line = &line[start..];
            if line[0] == b'#' {
                continue;
            }

            match parse_xyz(line) {
                Some(point) => return Ok(Some(point)),
                None if self.reader.lenient => {
                    self.reader.errors.report(
                        Severity::Warning,
                        &format!("line {}: expected three numeric columns, skipped", self.line),
                    );
                }
                None => {
                    return Err(PipelineError::Parse {
                        line: self.line,
                        message: format!(
                            "expected three numeric columns, got '{}'",
                            String::from_utf8_lossy(line)
                        ),
                    });
                }
            }
        }
        Ok(None)
    }
}

impl StageIterator for TextIterator<'_> {
    fn read_up_to(&mut self, buffer: &mut PointBuffer, max: usize) -> Result<usize> {
        check_buffer_schema(self.reader.name(), self.reader.schema(), buffer)?;
        buffer.clear();
        let fields = [
            buffer.field_index(DimensionId::XF64)?,
            buffer.field_index(DimensionId::YF64)?,
            buffer.field_index(DimensionId::ZF64)?,
        ];

        let limit = max.min(buffer.capacity());
        let mut n = 0;
        while n < limit {
            let Some(point) = self.next_point()? else {
                break;
            };
            for (&field, &v) in fields.iter().zip(&point) {
                buffer.set::<f64>(n, field, v)?;
            }
            n += 1;
        }
        buffer.set_num_points(n)?;
        self.index += n as u64;
        Ok(n)
    }

    fn skip(&mut self, count: u64) -> Result<u64> {
        let mut skipped = 0;
        while skipped < count && self.next_point()?.is_some() {
            skipped += 1;
        }
        self.index += skipped;
        Ok(skipped)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn index(&self) -> u64 {
        self.index
    }
}

/// How one output column is read and formatted.
#[derive(Debug, Clone, Copy)]
enum Column {
    /// Unscaled signed integer, widened to `i64`.
    Signed(usize, DataType),
    /// Unscaled unsigned integer, widened to `u64`.
    Unsigned(usize, DataType),
    /// Anything else, as a real value with scaling applied.
    Real(usize),
}

impl Column {
    fn for_dimension(field: usize, datatype: DataType, scaled: bool) -> Self {
        if !datatype.is_integer() || scaled {
            Column::Real(field)
        } else if datatype.is_signed() {
            Column::Signed(field, datatype)
        } else {
            Column::Unsigned(field, datatype)
        }
    }
}

/// Writes one line per point with every numeric dimension as a column.
///
/// Integer dimensions without scaling are written as integers at full
/// width, everything else as the shortest round-tripping decimal.
pub struct TextWriter<W: Write> {
    out: BufWriter<W>,
    columns: Vec<Column>,
    header: bool,
    ryu: ryu::Buffer,
    itoa: itoa::Buffer,
}

impl TextWriter<File> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write> TextWriter<W> {
    pub fn new(writer: W) -> Self {
        Self::with_capacity(DEFAULT_OUTPUT_BUFFER, writer)
    }

    pub fn with_capacity(capacity: usize, writer: W) -> Self {
        Self {
            out: BufWriter::with_capacity(capacity, writer),
            columns: Vec::new(),
            header: true,
            ryu: ryu::Buffer::new(),
            itoa: itoa::Buffer::new(),
        }
    }

    /// Skip the `#` header line.
    pub fn without_header(mut self) -> Self {
        self.header = false;
        self
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> Result<W> {
        self.out.into_inner().map_err(|e| e.into_error().into())
    }
}

impl<W: Write> PointSink for TextWriter<W> {
    fn begin(&mut self, schema: &Schema) -> Result<()> {
        let layout = SchemaLayout::new(schema);
        self.columns.clear();
        let mut names = Vec::new();
        for entry in layout.dimension_layouts() {
            let dim = entry.dimension();
            if !dim.is_numeric() {
                continue;
            }
            self.columns.push(Column::for_dimension(
                entry.position(),
                dim.datatype(),
                dim.is_finite_precision(),
            ));
            names.push(dim.name());
        }
        if self.header {
            writeln!(self.out, "# {}", names.join(","))?;
        }
        Ok(())
    }

    fn write_buffer(&mut self, buffer: &PointBuffer) -> Result<usize> {
        for i in 0..buffer.num_points() {
            for (k, &column) in self.columns.iter().enumerate() {
                if k > 0 {
                    self.out.write_all(b",")?;
                }
                let text = match column {
                    Column::Signed(field, datatype) => {
                        let value = match datatype {
                            DataType::Int8 => i64::from(buffer.get::<i8>(i, field)?),
                            DataType::Int16 => i64::from(buffer.get::<i16>(i, field)?),
                            DataType::Int32 => i64::from(buffer.get::<i32>(i, field)?),
                            _ => buffer.get::<i64>(i, field)?,
                        };
                        self.itoa.format(value)
                    }
                    Column::Unsigned(field, datatype) => {
                        let value = match datatype {
                            DataType::Uint8 => u64::from(buffer.get::<u8>(i, field)?),
                            DataType::Uint16 => u64::from(buffer.get::<u16>(i, field)?),
                            DataType::Uint32 => u64::from(buffer.get::<u32>(i, field)?),
                            _ => buffer.get::<u64>(i, field)?,
                        };
                        self.itoa.format(value)
                    }
                    Column::Real(field) => self.ryu.format(buffer.get_scaled(i, field)?),
                };
                self.out.write_all(text.as_bytes())?;
            }
            self.out.write_all(b"\n")?;
        }
        Ok(buffer.num_points())
    }

    fn end(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}
