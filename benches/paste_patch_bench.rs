use criterion::{black_box, criterion_group, criterion_main, Criterion};
use indoc::indoc;
use paste_patch::{apply_patch_to_content, find_context, ApplyOptions, Patch};

// --- Parsing Benchmarks ---

fn parsing_benches(c: &mut Criterion) {
    let mut group = c.benchmark_group("Parsing");

    let simple_patch = indoc! {r#"
        --- a/src/main.rs
        +++ b/src/main.rs
        @@ -1,3 +1,3 @@
         fn main() {
        -    println!("Hello, world!");
        +    println!("Hello, patch!");
         }
    "#};
    group.bench_function("simple_patch", |b| {
        b.iter(|| Patch::parse(black_box(simple_patch)).unwrap())
    });

    let mut large_patch = String::new();
    for i in 0..100 {
        large_patch.push_str(&format!(
            "@@ -{},3 +{},3 @@\n context line {}\n-old line {}\n+new line {}\n",
            i * 5 + 1,
            i * 5 + 1,
            i,
            i,
            i
        ));
    }
    group.bench_function("large_patch_100_hunks", |b| {
        b.iter(|| Patch::parse(black_box(&large_patch)).unwrap())
    });

    // Prose pasted ahead of the patch must be skipped by the splitter.
    let mut noisy_patch = "Here is the change you asked for.\n".repeat(1000);
    noisy_patch.push_str(simple_patch);
    group.bench_function("leading_prose_scan", |b| {
        b.iter(|| Patch::parse(black_box(&noisy_patch)).unwrap())
    });

    group.finish();
}

// --- Applying Benchmarks ---

/// Helper struct to manage state for apply benchmarks, keeping setup code clean.
struct ApplyBenchSetup {
    patch: Patch,
    initial_content: String,
}

fn numbered_content(count: usize) -> String {
    (0..count)
        .map(|i| format!("This is line number {}\n", i))
        .collect()
}

fn applying_benches(c: &mut Criterion) {
    let mut group = c.benchmark_group("Applying");
    let options = ApplyOptions::default();

    // --- Benchmark 1: Exact match deep in a large file ---
    let exact_large_setup = ApplyBenchSetup {
        patch: Patch::parse(indoc! {"
            @@ -5000,5 +5000,5 @@
             This is line number 4999
             This is line number 5000
            -This is line number 5001
            +THIS LINE WAS CHANGED
             This is line number 5002
             This is line number 5003
        "})
        .unwrap(),
        initial_content: numbered_content(10000),
    };

    group.bench_function("exact_match_large_file", |b| {
        b.iter(|| {
            black_box(apply_patch_to_content(
                black_box(&exact_large_setup.patch),
                black_box(&exact_large_setup.initial_content),
                &options,
            ))
        });
    });

    // --- Benchmark 2: Partial match after drift ---
    let drifted_content =
        numbered_content(10000).replace("This is line number 5002\n", "A drifted line\n");
    let partial_setup = ApplyBenchSetup {
        patch: exact_large_setup.patch.clone(),
        initial_content: drifted_content,
    };

    group.bench_function("partial_match_large_file", |b| {
        b.iter(|| {
            black_box(apply_patch_to_content(
                black_box(&partial_setup.patch),
                black_box(&partial_setup.initial_content),
                &options,
            ))
        });
    });

    // --- Benchmark 3: Every line is an anchor, none matches fully ---
    let repetitive_content = "println!(\"hello world\");\n".repeat(10000);
    let worst_case_setup = ApplyBenchSetup {
        patch: Patch::parse(indoc! {r#"
            @@ -5000,4 +5000,4 @@
             println!("hello world");
            -println!("hello world");
            +println!("goodbye world");
             This context line never appears
        "#})
        .unwrap(),
        initial_content: repetitive_content,
    };

    group.bench_function("worst_case_all_anchors", |b| {
        b.iter(|| {
            black_box(apply_patch_to_content(
                black_box(&worst_case_setup.patch),
                black_box(&worst_case_setup.initial_content),
                &options,
            ))
        });
    });

    // --- Benchmark 4: Many sequential hunks ---
    let mut many_hunks = String::new();
    for i in (0..10000).step_by(100) {
        many_hunks.push_str(&format!(
            "@@ -{},2 +{},2 @@\n This is line number {}\n-This is line number {}\n+Changed line {}\n",
            i + 1,
            i + 1,
            i,
            i + 1,
            i + 1
        ));
    }
    let sequential_setup = ApplyBenchSetup {
        patch: Patch::parse(&many_hunks).unwrap(),
        initial_content: numbered_content(10000),
    };

    group.bench_function("sequential_100_hunks", |b| {
        b.iter(|| {
            black_box(apply_patch_to_content(
                black_box(&sequential_setup.patch),
                black_box(&sequential_setup.initial_content),
                &options,
            ))
        });
    });

    group.finish();
}

// --- Search Benchmarks ---

fn search_benches(c: &mut Criterion) {
    let mut group = c.benchmark_group("Search");

    let content = numbered_content(10000);
    let lines: Vec<&str> = content.split('\n').collect();
    let fingerprint = [
        "This is line number 9000",
        "This is line number 9001",
        "This is line number 9002",
    ];

    group.bench_function("find_context_unbounded", |b| {
        b.iter(|| find_context(black_box(&lines), black_box(&fingerprint), 0, None))
    });
    group.bench_function("find_context_windowed", |b| {
        b.iter(|| find_context(black_box(&lines), black_box(&fingerprint), 8900, Some(200)))
    });

    // Every line is an anchor and the first one is already a perfect match.
    let braces = vec!["}"; 200_000];
    let brace_fingerprint = vec!["}"; 500];
    group.bench_function("find_context_early_perfect_match", |b| {
        b.iter(|| find_context(black_box(&braces), black_box(&brace_fingerprint), 0, None))
    });

    group.finish();
}

criterion_group!(benches, parsing_benches, applying_benches, search_benches);
criterion_main!(benches);
