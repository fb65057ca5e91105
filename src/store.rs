use crate::config::TrainConfig;
use crate::error::{Result, W2vError};
use crate::model::Model;
use crate::vocab::{Vocab, VocabEntry};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use ndarray::Array2;
use ndarray_npy::write_npy;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

pub const MAGIC: &[u8; 4] = b"W2VM";
pub const FORMAT_VERSION: u32 = 1;

// upper bound on rows read per chunk, keeps a corrupt header from triggering a huge allocation
const READ_CHUNK: usize = 1 << 16;
const MAX_TOKEN_BYTES: u32 = 1 << 20;


fn is_gzip(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "gz")
}

fn open_reader(path: &Path) -> Result<Box<dyn BufRead>> {
    let f = BufReader::new(File::open(path)?);
    if is_gzip(path) {
        Ok(Box::new(BufReader::new(GzDecoder::new(f))))
    } else {
        Ok(Box::new(f))
    }
}

fn corrupt(msg: impl Into<String>) -> W2vError {
    W2vError::CorruptModel(msg.into())
}

// a short read means the header promised more than the file holds
fn truncated(section: &'static str) -> impl Fn(io::Error) -> W2vError {
    move |e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            corrupt(format!("file ends inside the {}", section))
        } else {
            W2vError::Io(e)
        }
    }
}

fn read_floats<R: Read>(r: &mut R, n: usize, section: &'static str) -> Result<Vec<f32>> {
    let mut data: Vec<f32> = Vec::with_capacity(n.min(READ_CHUNK));
    let mut buf = vec![0f32; n.min(READ_CHUNK)];
    let mut remaining = n;
    while remaining > 0 {
        let take = remaining.min(READ_CHUNK);
        r.read_f32_into::<LittleEndian>(&mut buf[..take]).map_err(truncated(section))?;
        data.extend_from_slice(&buf[..take]);
        remaining -= take;
    }
    Ok(data)
}

fn write_model<W: Write>(model: &Model, w: &mut W) -> Result<()> {

    let vocab = model.vocab();
    w.write_all(MAGIC)?;
    w.write_u32::<LittleEndian>(FORMAT_VERSION)?;
    w.write_u64::<LittleEndian>(vocab.len() as u64)?;
    w.write_u64::<LittleEndian>(model.dimension() as u64)?;

    match model.hyperparameters() {
        Some(config) => {
            let encoded = bincode::serialize(config)?;
            w.write_u8(1)?;
            w.write_u32::<LittleEndian>(encoded.len() as u32)?;
            w.write_all(&encoded)?;
        },
        None => w.write_u8(0)?
    }

    for entry in vocab.entries() {
        let bytes = entry.token.as_bytes();
        w.write_u32::<LittleEndian>(bytes.len() as u32)?;
        w.write_all(bytes)?;
        w.write_u64::<LittleEndian>(entry.count)?;
    }

    // row-major, in id order
    for x in model.vectors().iter() {
        w.write_f32::<LittleEndian>(*x)?;
    }
    Ok(())
}

fn read_model<R: Read>(r: &mut R) -> Result<Model> {

    let mut magic = [0u8; 4];
    r.read_exact(&mut magic).map_err(truncated("header"))?;
    if &magic != MAGIC {
        return Err(corrupt("missing model file signature"))
    }
    let version = r.read_u32::<LittleEndian>().map_err(truncated("header"))?;
    if version != FORMAT_VERSION {
        return Err(W2vError::UnsupportedVersion(version))
    }

    let vocab_size = r.read_u64::<LittleEndian>().map_err(truncated("header"))?;
    let dimension = r.read_u64::<LittleEndian>().map_err(truncated("header"))?;
    let vocab_size = usize::try_from(vocab_size).map_err(|_| corrupt("vocabulary size out of range"))?;
    let dimension = usize::try_from(dimension).map_err(|_| corrupt("dimension out of range"))?;
    let n_values = vocab_size.checked_mul(dimension).ok_or_else(|| corrupt("vector section size overflows"))?;

    let hyperparameters: Option<TrainConfig> = match r.read_u8().map_err(truncated("header"))? {
        0 => None,
        1 => {
            let len = r.read_u32::<LittleEndian>().map_err(truncated("header"))?;
            let mut encoded = Vec::new();
            r.by_ref().take(len as u64).read_to_end(&mut encoded)?;
            if encoded.len() != len as usize {
                return Err(corrupt("file ends inside the hyperparameters"))
            }
            let config: TrainConfig = bincode::deserialize(&encoded).map_err(|e| corrupt(format!("bad hyperparameters: {}", e)))?;
            if config.dimension != dimension {
                return Err(corrupt(format!("header dimension {} differs from trained dimension {}", dimension, config.dimension)))
            }
            Some(config)
        },
        flag => return Err(corrupt(format!("unknown hyperparameter flag {}", flag)))
    };

    let mut entries: Vec<VocabEntry> = Vec::with_capacity(vocab_size.min(READ_CHUNK));
    for _ in 0..vocab_size {
        let len = r.read_u32::<LittleEndian>().map_err(truncated("vocabulary"))?;
        if len > MAX_TOKEN_BYTES {
            return Err(corrupt(format!("token length {} is implausible", len)))
        }
        let mut bytes = vec![0u8; len as usize];
        r.read_exact(&mut bytes).map_err(truncated("vocabulary"))?;
        let token = String::from_utf8(bytes).map_err(|_| corrupt("token is not valid utf-8"))?;
        let count = r.read_u64::<LittleEndian>().map_err(truncated("vocabulary"))?;
        entries.push(VocabEntry { token, count });
    }

    let data = read_floats(r, n_values, "vectors")?;
    let mut probe = [0u8; 1];
    if r.read(&mut probe)? != 0 {
        return Err(corrupt("unexpected bytes after the vector section"))
    }

    let vocab = Vocab::from_entries(entries)?;
    let vectors = Array2::from_shape_vec((vocab_size, dimension), data).map_err(|e| corrupt(e.to_string()))?;
    Model::new(vocab, vectors, hyperparameters)
}

/// Writes `model` in the native binary format. A path ending in `.gz` is
/// gzip-compressed.
pub fn save<P: AsRef<Path>>(model: &Model, path: P) -> Result<()> {

    // checked before the file exists, so a rejected model leaves nothing behind
    if let Some(entry) = model.vocab().entries().iter().find(|e| e.token.len() > MAX_TOKEN_BYTES as usize) {
        return Err(W2vError::InvalidConfig(format!(
            "token of {} bytes exceeds the {} byte limit of the model format", entry.token.len(), MAX_TOKEN_BYTES)))
    }

    let path = path.as_ref();
    let f = BufWriter::new(File::create(path)?);
    if is_gzip(path) {
        let mut writer = GzEncoder::new(f, Compression::default());
        write_model(model, &mut writer)?;
        writer.finish()?.flush()?;
    } else {
        let mut writer = f;
        write_model(model, &mut writer)?;
        writer.flush()?;
    }
    Ok(())
}

/// Reads a model written by `save`.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Model> {
    let mut reader = open_reader(path.as_ref())?;
    read_model(&mut reader)
}

fn read_pretrained_token<R: BufRead>(r: &mut R) -> Result<String> {

    // records may be separated by a newline, the token ends at a space or NUL
    let mut bytes: Vec<u8> = Vec::new();
    loop {
        let b = r.read_u8().map_err(truncated("records"))?;
        match b {
            b'\n' | b'\r' if bytes.is_empty() => continue,
            b' ' | 0 => break,
            _ => bytes.push(b)
        }
        if bytes.len() > MAX_TOKEN_BYTES as usize {
            return Err(corrupt("unterminated token"))
        }
    }
    if bytes.is_empty() {
        return Err(corrupt("empty token"))
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn read_pretrained<R: BufRead>(r: &mut R) -> Result<Model> {

    let mut header = String::new();
    r.read_line(&mut header).map_err(|e| match e.kind() {
        io::ErrorKind::InvalidData => corrupt("header line is not valid utf-8"),
        _ => W2vError::Io(e)
    })?;
    let sizes: Vec<usize> = header.split_whitespace().map(|x| x.parse::<usize>()).collect::<std::result::Result<_, _>>()
        .map_err(|_| corrupt(format!("bad header line '{}'", header.trim())))?;
    let (vocab_size, dimension) = match sizes.as_slice() {
        [v, d] if *d > 0 => (*v, *d),
        _ => return Err(corrupt(format!("bad header line '{}'", header.trim())))
    };

    let n_values = vocab_size.checked_mul(dimension).ok_or_else(|| corrupt("vector section size overflows"))?;

    let mut entries: Vec<VocabEntry> = Vec::with_capacity(vocab_size.min(READ_CHUNK));
    let mut data: Vec<f32> = Vec::with_capacity(n_values.min(READ_CHUNK));
    let mut seen: HashSet<String> = HashSet::with_capacity(vocab_size.min(READ_CHUNK));
    for _ in 0..vocab_size {
        let token = read_pretrained_token(r)?;
        let vector = read_floats(r, dimension, "records")?;
        // lossy decoding can map distinct byte strings to one token, first record wins
        if !seen.insert(token.clone()) {
            continue
        }
        data.extend(vector);
        // no counts in this format, keep file order as frequency order
        entries.push(VocabEntry { token, count: (vocab_size - entries.len()) as u64 });
    }

    let rows = entries.len();
    let vocab = Vocab::from_entries(entries)?;
    let vectors = Array2::from_shape_vec((rows, dimension), data).map_err(|e| corrupt(e.to_string()))?;
    Model::new(vocab, vectors, None)
}

/// Imports a word2vec binary vector file (`"<vocab_size> <dimension>\n"`
/// followed by `token ' ' f32 * dimension` records). The result is read-only.
/// A token repeated in the file keeps its first vector.
pub fn load_pretrained_binary<P: AsRef<Path>>(path: P) -> Result<Model> {
    let mut reader = open_reader(path.as_ref())?;
    read_pretrained(&mut reader)
}

/// Writes `vecs.npy` and `words.json` (token to row index) into `output_dir`.
pub fn export_npy<P: AsRef<Path>>(model: &Model, output_dir: P) -> Result<()> {

    let output_dir = output_dir.as_ref();
    fs::create_dir_all(output_dir)?;
    write_npy(output_dir.join("vecs.npy"), model.vectors())?;

    let mut f = BufWriter::new(File::create(output_dir.join("words.json"))?);
    serde_json::to_writer(&mut f, model.vocab().t2i())?;
    f.flush()?;
    Ok(())
}
