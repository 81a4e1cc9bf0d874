use anyhow::Result;
use clap::Parser;
use crossbeam_channel::{bounded, Receiver, Sender};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use silva2sintax::convert_header;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Parser)]
#[command(name = "silva2sintax")]
#[command(about = "Convert SILVA 138.2 dada2 FASTA headers to usearch SINTAX tax= format")]
#[command(long_about = "Convert SILVA 138.2 dada2 FASTA headers to usearch SINTAX tax= format.

Rules applied to each of the 7 ranks (k,p,c,o,f,g,s):
  - only the exact token \"UCG-001\" becomes \"<parent> UCG-001\" (UCG-002 etc. are left alone)
  - names containing endosymbiont become <parent>_endosymbionts
  - Incertae_Sedis / unidentified / uncultured and similar placeholders become <parent>_X
  - missing ranks become <parent>_X; a missing or invalid species becomes <genus>_sp")]
struct Args {
    #[arg(help = "Input FASTA file (SILVA dada2 format, .gz supported)")]
    input: PathBuf,

    #[arg(default_value = "sintax_uCG001_perfect.fa", help = "Output FASTA file (.gz to compress)")]
    output: PathBuf,

    #[arg(short = 't', long, default_value = "4", help = "Number of threads")]
    threads: usize,

    #[arg(short = 'b', long, default_value = "200000", help = "Batch size (lines) for processing")]
    batch_size: usize,

    #[arg(short = 'v', long, default_value = "false", help = "Verbose output showing progress")]
    verbose: bool,
}

#[derive(Debug, Clone)]
enum InputLine {
    // header 行（不含开头的 '>'），index 是全文件中 1 起始的 header 序号
    Header { text: String, index: u64 },
    // 序列行等其他行，原样输出
    Plain(String),
}

fn open_reader(path: &PathBuf) -> Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)?;

    if path.extension().and_then(|s| s.to_str()) == Some("gz") {
        let decoder = MultiGzDecoder::new(file);
        // 增加缓冲区到2MB
        Ok(Box::new(BufReader::with_capacity(2 << 20, decoder)))
    } else {
        // 增加缓冲区到2MB
        Ok(Box::new(BufReader::with_capacity(2 << 20, file)))
    }
}

fn create_writer(path: &PathBuf) -> Result<Box<dyn Write + Send>> {
    let file = File::create(path)?;

    if path.extension().and_then(|s| s.to_str()) == Some("gz") {
        // ① 更低压缩等级：level 1≈4～5 倍速度
        let encoder = GzEncoder::new(file, Compression::new(1));
        // ② 更大的 BufWriter：减少 sys‑call 次数
        Ok(Box::new(BufWriter::with_capacity(4 << 20, encoder)))
    } else {
        Ok(Box::new(BufWriter::with_capacity(4 << 20, file)))
    }
}

fn convert_batch(batch: Vec<InputLine>) -> Vec<String> {
    batch
        .into_iter()
        .map(|line| match line {
            InputLine::Header { text, index } => convert_header(&text, index),
            InputLine::Plain(text) => text,
        })
        .collect()
}

// reader → worker pool → writer 流水线，返回 (header 条数, 总行数)
fn run_pipeline(
    reader: Box<dyn BufRead + Send>,
    writer: Box<dyn Write + Send>,
    threads: usize,
    batch_size: usize,
    verbose: bool,
) -> Result<(u64, u64)> {
    // Channels carry (batch id, lines); the writer reassembles batches in id
    // order so the output order always matches the input order.
    let (batch_tx, batch_rx): (Sender<(usize, Vec<InputLine>)>, Receiver<(usize, Vec<InputLine>)>) =
        bounded(50);
    let (output_tx, output_rx): (Sender<(usize, Vec<String>)>, Receiver<(usize, Vec<String>)>) =
        bounded(50);

    // Statistics
    let header_count = Arc::new(Mutex::new(0u64));
    let line_count = Arc::new(Mutex::new(0u64));

    // Start reader thread - header 序号在这里按输入顺序统一分配
    let read_headers = Arc::clone(&header_count);
    let read_lines = Arc::clone(&line_count);
    let reader_handle = thread::spawn(move || -> Result<()> {
        let mut headers = 0u64;
        let mut total = 0u64;
        let mut batch_id = 0usize;
        let mut batch = Vec::with_capacity(batch_size);

        for line in reader.lines() {
            let line = line?;
            total += 1;

            if let Some(rest) = line.strip_prefix('>') {
                headers += 1;
                batch.push(InputLine::Header {
                    text: rest.to_string(),
                    index: headers,
                });
            } else {
                batch.push(InputLine::Plain(line));
            }

            if batch.len() >= batch_size {
                let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                if batch_tx.send((batch_id, full)).is_err() {
                    println!("Channel send failed, stopping reader");
                    break;
                }
                batch_id += 1;
            }

            if verbose && total % 1_000_000 == 0 {
                println!("Read {} lines ({} headers)...", total, headers);
            }
        }

        if !batch.is_empty() && batch_tx.send((batch_id, batch)).is_err() {
            println!("Channel send failed, stopping reader");
        }

        *read_headers.lock().unwrap() = headers;
        *read_lines.lock().unwrap() = total;

        if verbose {
            println!("Finished reading {} lines ({} headers)", total, headers);
        }
        Ok(())
    });

    // Start processing threads
    let mut processing_handles = Vec::new();
    for _ in 0..threads {
        let rx = batch_rx.clone();
        let tx = output_tx.clone();

        let handle = thread::spawn(move || {
            while let Ok((batch_id, batch)) = rx.recv() {
                let converted = convert_batch(batch);
                if tx.send((batch_id, converted)).is_err() {
                    break;
                }
            }
        });
        processing_handles.push(handle);
    }

    // Writer thread - 乱序到达的 batch 先暂存，严格按序号写出
    let writer_handle = thread::spawn(move || -> Result<()> {
        let mut writer = writer;
        let mut buffer = Vec::with_capacity(1 << 20); // 1MB buffer
        let mut pending: HashMap<usize, Vec<String>> = HashMap::new();
        let mut next_batch = 0usize;
        let mut written = 0u64;

        while let Ok((batch_id, lines)) = output_rx.recv() {
            pending.insert(batch_id, lines);

            while let Some(lines) = pending.remove(&next_batch) {
                buffer.clear();
                for line in &lines {
                    buffer.extend_from_slice(line.as_bytes());
                    buffer.push(b'\n');
                }
                writer.write_all(&buffer)?;
                written += lines.len() as u64;
                next_batch += 1;
            }
        }

        writer.flush()?;
        if verbose {
            println!("Finished writing {} lines", written);
        }
        Ok(())
    });

    // Wait for reader to finish (its batch_tx drops here, signalling workers)
    reader_handle.join().unwrap()?;

    // Wait for all processing threads to finish
    for handle in processing_handles {
        handle.join().unwrap();
    }

    // Close output channel to signal the writer to finish
    drop(output_tx);

    writer_handle.join().unwrap()?;

    let total_headers = *header_count.lock().unwrap();
    let total_lines = *line_count.lock().unwrap();
    Ok((total_headers, total_lines))
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.verbose {
        println!(
            "Converting {} -> {} (batch size: {})",
            args.input.display(),
            args.output.display(),
            args.batch_size
        );
    }

    let reader = open_reader(&args.input)?;
    let writer = create_writer(&args.output)?;

    let (total_headers, total_lines) =
        run_pipeline(reader, writer, args.threads, args.batch_size, args.verbose)?;

    println!("Processing complete!");
    println!("Converted headers: {}", total_headers);
    println!("Total lines: {}", total_lines);
    println!("Output file: {}", args.output.display());

    Ok(())
}
