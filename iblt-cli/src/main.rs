use clap::{Parser, Subcommand};
use iblt::{Bitstring, Iblt, Options};
use log::info;
use rand::Rng;

#[derive(Parser, Debug)]
#[command(name = "iblt-cli", about = "Exercise an Invertible Bloom Lookup Table from the command line")]
struct Cli {
    /// Number of hash functions (columns).
    #[arg(short = 'k', long, default_value_t = 4)]
    k: usize,

    /// Minimum total number of cells across all columns.
    #[arg(short = 'c', long, default_value_t = 1000)]
    cells: usize,

    /// Disable prime-sized columns; round up to a multiple of k instead.
    #[arg(long)]
    no_prime: bool,

    #[command(subcommand)]
    command: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Insert N random (key, value) pairs, then report is_element/get/fpr.
    Random {
        /// Number of random entries to insert.
        #[arg(short = 'n', long, default_value_t = 100)]
        n: usize,
    },
    /// Insert N random entries, then attempt to list every (key, value) pair back out.
    List {
        #[arg(short = 'n', long, default_value_t = 100)]
        n: usize,
    },
}

fn random_bitstring(rng: &mut impl Rng, bytes: usize) -> Bitstring {
    let buf: Vec<u8> = (0..bytes).map(|_| rng.gen()).collect();
    Bitstring::from_bytes(&buf, bytes * 8)
}

fn main() {
    env_logger::builder().filter_level(log::LevelFilter::Info).init();
    let cli = Cli::parse();

    let options = if cli.no_prime {
        Options::cells_only()
    } else {
        Options::default()
    };
    let mut table: Iblt = Iblt::new(cli.k, cli.cells, options).expect("invalid IBLT configuration");
    info!(
        "built IBLT: k={} col_size={} cell_count={}",
        table.k(),
        table.col_size(),
        table.cell_count()
    );

    let mut rng = rand::thread_rng();

    match cli.command {
        Mode::Random { n } => {
            let mut entries = Vec::with_capacity(n);
            for i in 0..n {
                let key = random_bitstring(&mut rng, 8);
                let value = i as u64;
                table.insert(&key, value);
                entries.push((key, value));
            }
            let (key, value) = &entries[0];
            println!("inserted {} entries", n);
            println!("is_element(first key) = {}", table.is_element(key));
            println!("get(first key) = {:?} (expected {})", table.get(key), value);
            println!("estimated false-positive rate = {:.6}", table.get_fpr());
        }
        Mode::List { n } => {
            let mut entries = Vec::with_capacity(n);
            for i in 0..n {
                let key = random_bitstring(&mut rng, 8);
                let value = i as u64;
                table.insert(&key, value);
                entries.push((key, value));
            }
            let decoded = table.list_entries();
            println!(
                "inserted {} entries, recovered {} via peeling",
                entries.len(),
                decoded.len()
            );
        }
    }
}
