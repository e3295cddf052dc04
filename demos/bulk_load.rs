use cavdb::VecStore;
use std::time::Instant;

const NUM_VECTORS: usize = 1000;
const DIM: usize = 128;
const NUM_QUERIES: usize = 10;
const K: usize = 10;

fn random_vector(dim: usize, seed: u64) -> Vec<f64> {
    let mut state = seed;
    (0..dim)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            ((state >> 33) as f64) / (u32::MAX as f64)
        })
        .collect()
}

fn main() {
    println!("Generating {} random {}-d vectors...", NUM_VECTORS, DIM);
    let store = VecStore::new(DIM);

    let start = Instant::now();
    for i in 0..NUM_VECTORS {
        let vec = random_vector(DIM, i as u64);
        if let Err(e) = store.insert(vec) {
            eprintln!("insert failed: {}", e);
            std::process::exit(1);
        }
        if i % 100 == 0 {
            println!("  inserted {} rows", i);
        }
    }
    let insert_time = start.elapsed();
    println!("Insert: {:.3}s ({:.0} inserts/s)",
        insert_time.as_secs_f64(),
        NUM_VECTORS as f64 / insert_time.as_secs_f64());
    println!("current count is {}", store.count());

    // Content-addressing demo: re-inserting the same data is a no-op
    let mut duplicates = 0;
    for i in 0..10 {
        let vec = random_vector(DIM, i as u64);
        match store.insert(vec) {
            Ok((_, false)) => duplicates += 1,
            Ok((id, true)) => println!("unexpected new record {}", id),
            Err(e) => eprintln!("insert failed: {}", e),
        }
    }
    println!("re-inserted 10 rows, {} deduplicated, count still {}\n", duplicates, store.count());

    let mut timings = Vec::with_capacity(NUM_QUERIES);
    let mut results = Vec::with_capacity(NUM_QUERIES);
    for q in 0..NUM_QUERIES {
        let probe = random_vector(DIM, 1_000_000 + q as u64);

        let start = Instant::now();
        match store.knn(&probe, K) {
            Ok(ranked) => results.push(ranked),
            Err(e) => {
                eprintln!("query failed: {}", e);
                std::process::exit(1);
            }
        }
        timings.push(start.elapsed().as_secs_f64());
    }

    println!("average timing is {:.6}s", timings.iter().sum::<f64>() / timings.len() as f64);
    println!("results are (note they are increasing):");
    for ranked in &results {
        let distances: Vec<f64> = ranked.iter().map(|(_, d)| *d).collect();
        println!("{:?}", distances);
    }
}
