use super::{merge, reorder::ReorderBuffer, types::MergeBatchResult};
use crate::cli::{Cli, Command, MergeArgs, MergeArgsInner};
use clap::Parser;
use std::{fs, path::PathBuf, thread, time::Duration};

fn make_temp_dir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("gvx_test_merge_")
        .tempdir()
        .expect("temp dir should be creatable")
}

fn write_gvcf(dir: &tempfile::TempDir, name: &str, sample: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    let contents = format!(
        "##fileformat=VCFv4.2\n\
         #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\t{sample}\n\
         {body}"
    );
    fs::write(&path, contents).expect("test gVCF should be writable");
    path
}

fn parse_merge_args(args: &[&str]) -> MergeArgs {
    let parsed = Cli::try_parse_from(args).expect("CLI parse should succeed");
    let Command::Merge(args) = parsed.command;
    args
}

fn merge_to_file(inputs: &[PathBuf], out_path: &PathBuf, extra: &[&str]) -> crate::error::GvxResult<()> {
    crate::utils::util::init_logger();
    let out = out_path.to_string_lossy().into_owned();
    let mut argv = vec!["gvx", "merge", "-o", &out, "--no-version", "--gvcf"];
    let input_strings: Vec<String> = inputs
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    argv.extend(input_strings.iter().map(String::as_str));
    argv.extend(extra);
    merge(parse_merge_args(&argv))
}

fn body_lines(path: &PathBuf) -> Vec<String> {
    fs::read_to_string(path)
        .expect("merged output should exist")
        .lines()
        .filter(|line| !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[test]
fn test_block_splits_around_overlapping_variant() {
    let dir = make_temp_dir();
    let a = write_gvcf(
        &dir,
        "a.g.vcf",
        "alpha",
        "chr1\t100\t.\tA\t<NON_REF>\t.\t.\tEND=200\tGT:DP\t0/0:20\n",
    );
    let b = write_gvcf(
        &dir,
        "b.g.vcf",
        "beta",
        "chr1\t150\t.\tA\tT\t30\t.\t.\tGT:DP\t0/1:12\n",
    );
    let out = dir.path().join("merged.g.vcf");

    merge_to_file(&[a, b], &out, &[]).expect("merge should succeed");

    let lines = body_lines(&out);
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("chr1\t100\t"));
    assert!(lines[0].contains("END=149"));
    assert!(lines[0].ends_with("0/0:20\t./.:."));
    assert_eq!(
        lines[1],
        "chr1\t150\t.\tA\tT,<NON_REF>\t.\t.\t.\tGT:DP\t0/0:20\t0/1:12"
    );
    assert!(lines[2].starts_with("chr1\t151\t"));
    assert!(lines[2].contains("END=200"));
    assert!(lines[2].ends_with("0/0:20\t./.:."));
}

#[test]
fn test_rejected_filter_records_are_dropped() {
    let dir = make_temp_dir();
    let a = write_gvcf(
        &dir,
        "a.g.vcf",
        "alpha",
        "chr1\t100\t.\tA\tT\t30\tLowDepth\t.\tGT:DP\t0/1:3\n\
         chr1\t101\t.\tC\tG\t30\t.\t.\tGT:DP\t0/1:15\n",
    );
    let b = write_gvcf(
        &dir,
        "b.g.vcf",
        "beta",
        "chr1\t101\t.\tC\tG\t30\t.\t.\tGT:DP\t1/1:18\n",
    );
    let out = dir.path().join("merged.g.vcf");

    merge_to_file(&[a, b], &out, &[]).expect("merge should succeed");

    let lines = body_lines(&out);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("chr1\t101\t"));
    assert!(!fs::read_to_string(&out)
        .expect("merged output should exist")
        .contains("\t100\t"));
}

#[test]
fn test_insertion_alleles_merge_in_canonical_order() {
    let dir = make_temp_dir();
    let a = write_gvcf(
        &dir,
        "a.g.vcf",
        "alpha",
        "chr1\t100\t.\tA\tAT\t30\t.\t.\tGT:DP\t0/1:9\n",
    );
    let b = write_gvcf(
        &dir,
        "b.g.vcf",
        "beta",
        "chr1\t100\t.\tA\tAG\t30\t.\t.\tGT:DP\t0/1:11\n",
    );
    let out = dir.path().join("merged.g.vcf");

    merge_to_file(&[a, b], &out, &[]).expect("merge should succeed");

    let lines = body_lines(&out);
    assert_eq!(lines.len(), 1);
    let columns: Vec<&str> = lines[0].split('\t').collect();
    assert_eq!(columns[4], "AG,AT");
    // Stream order flips the GT of the AT carrier only.
    assert_eq!(columns[9], "0/2:9");
    assert_eq!(columns[10], "0/1:11");
}

#[test]
fn test_every_line_keeps_the_full_sample_roster() {
    let dir = make_temp_dir();
    let a = write_gvcf(
        &dir,
        "a.g.vcf",
        "alpha",
        "chr1\t100\t.\tA\t<NON_REF>\t.\t.\tEND=120\tGT:DP\t0/0:20\n\
         chr1\t130\t.\tC\tG\t30\t.\t.\tGT:DP\t0/1:14\n",
    );
    let b = write_gvcf(
        &dir,
        "b.g.vcf",
        "beta",
        "chr1\t110\t.\tG\tA\t30\t.\t.\tGT:DP\t1/1:17\n\
         chr1\t140\t.\tT\t<NON_REF>\t.\t.\tEND=160\tGT:DP\t0/0:19\n",
    );
    let out = dir.path().join("merged.g.vcf");

    merge_to_file(&[a, b], &out, &[]).expect("merge should succeed");

    for line in body_lines(&out) {
        assert_eq!(
            line.split('\t').count(),
            11,
            "line has a sample column per input stream: {line}"
        );
    }
}

#[test]
fn test_merge_is_idempotent_over_its_own_output() {
    let dir = make_temp_dir();
    let a = write_gvcf(
        &dir,
        "a.g.vcf",
        "alpha",
        "chr1\t100\t.\tA\t<NON_REF>\t.\t.\tEND=140\tGT:DP\t0/0:20\n\
         chr1\t150\t.\tA\tT\t30\t.\t.\tGT:DP\t0/1:12\n",
    );
    let b = write_gvcf(
        &dir,
        "b.g.vcf",
        "beta",
        "chr1\t100\t.\tA\t<NON_REF>\t.\t.\tEND=140\tGT:DP\t0/0:25\n\
         chr1\t150\t.\tA\tG\t30\t.\t.\tGT:DP\t1/1:16\n",
    );
    let first = dir.path().join("first.g.vcf");
    let second = dir.path().join("second.g.vcf");

    merge_to_file(&[a, b], &first, &[]).expect("first merge should succeed");
    merge_to_file(&[first.clone()], &second, &["--force-single"])
        .expect("second merge should succeed");

    assert_eq!(body_lines(&first), body_lines(&second));
}

#[test]
fn test_multi_batch_parallel_merge_stays_position_sorted() {
    let dir = make_temp_dir();
    let mut body_a = String::new();
    let mut body_b = String::new();
    for i in 0..40 {
        body_a.push_str(&format!(
            "chr1\t{}\t.\tA\tT\t30\t.\t.\tGT:DP\t0/1:{}\n",
            100 + i * 10,
            10 + i
        ));
        body_b.push_str(&format!(
            "chr1\t{}\t.\tG\tC\t30\t.\t.\tGT:DP\t1/1:{}\n",
            105 + i * 10,
            20 + i
        ));
    }
    let a = write_gvcf(&dir, "a.g.vcf", "alpha", &body_a);
    let b = write_gvcf(&dir, "b.g.vcf", "beta", &body_b);

    let serial_out = dir.path().join("serial.g.vcf");
    merge_to_file(&[a.clone(), b.clone()], &serial_out, &[]).expect("serial merge should succeed");

    let parallel_out = dir.path().join("parallel.g.vcf");
    let out = parallel_out.to_string_lossy().into_owned();
    let a_str = a.to_string_lossy().into_owned();
    let b_str = b.to_string_lossy().into_owned();
    let mut args = parse_merge_args(&[
        "gvx", "merge", "-o", &out, "--no-version", "-@", "4", "--gvcf", &a_str, &b_str,
    ]);
    // Tiny batches so the run spans many batch indices.
    args.merge_args = MergeArgsInner::new().with(|inner| {
        inner.batch_size = 1;
        inner.adaptive_batching = false;
    });
    merge(args).expect("parallel merge should succeed");

    let lines = body_lines(&parallel_out);
    assert_eq!(lines, body_lines(&serial_out));
    let positions: Vec<i64> = lines
        .iter()
        .map(|line| {
            line.split('\t')
                .nth(1)
                .expect("POS column")
                .parse()
                .expect("POS should be numeric")
        })
        .collect();
    let mut sorted = positions.clone();
    sorted.sort_unstable();
    assert_eq!(positions, sorted);
}

#[test]
fn test_single_input_requires_force_single() {
    let dir = make_temp_dir();
    let a = write_gvcf(
        &dir,
        "a.g.vcf",
        "alpha",
        "chr1\t100\t.\tA\tT\t30\t.\t.\tGT:DP\t0/1:12\n",
    );
    let out = dir.path().join("merged.g.vcf");

    let err = merge_to_file(&[a.clone()], &out, &[]).expect_err("single input should be refused");
    assert!(err.to_string().contains("--force-single"));

    merge_to_file(&[a], &out, &["--force-single"]).expect("forced single merge should succeed");
    assert_eq!(body_lines(&out).len(), 1);
}

#[test]
fn test_duplicate_sample_names_need_force_samples() {
    let dir = make_temp_dir();
    let a = write_gvcf(
        &dir,
        "a.g.vcf",
        "twin",
        "chr1\t100\t.\tA\tT\t30\t.\t.\tGT:DP\t0/1:12\n",
    );
    let b = write_gvcf(
        &dir,
        "b.g.vcf",
        "twin",
        "chr1\t100\t.\tA\tT\t30\t.\t.\tGT:DP\t1/1:15\n",
    );
    let out = dir.path().join("merged.g.vcf");

    let err = merge_to_file(&[a.clone(), b.clone()], &out, &[])
        .expect_err("duplicate samples should be refused");
    assert!(err.to_string().contains("twin"));

    merge_to_file(&[a, b], &out, &["--force-samples"]).expect("forced merge should succeed");
    let header_line = fs::read_to_string(&out)
        .expect("merged output should exist")
        .lines()
        .find(|line| line.starts_with("#CHROM"))
        .map(str::to_string)
        .expect("#CHROM line expected");
    assert!(header_line.ends_with("0:twin\t1:twin"));
}

#[test]
fn test_print_header_emits_header_only() {
    let dir = make_temp_dir();
    let a = write_gvcf(
        &dir,
        "a.g.vcf",
        "alpha",
        "chr1\t100\t.\tA\tT\t30\t.\t.\tGT:DP\t0/1:12\n",
    );
    let b = write_gvcf(
        &dir,
        "b.g.vcf",
        "beta",
        "chr1\t100\t.\tA\tT\t30\t.\t.\tGT:DP\t1/1:15\n",
    );
    let out = dir.path().join("merged.g.vcf");

    merge_to_file(&[a, b], &out, &["--print-header"]).expect("merge should succeed");

    let contents = fs::read_to_string(&out).expect("merged output should exist");
    assert!(contents.lines().all(|line| line.starts_with('#')));
    assert!(contents.contains("#CHROM"));
    assert!(body_lines(&out).is_empty());
}

#[test]
fn test_results_write_in_batch_order_despite_delays() {
    let (sender, receiver) = crossbeam_channel::unbounded::<MergeBatchResult>();

    let slow_sender = sender.clone();
    let slow = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        slow_sender
            .send(MergeBatchResult {
                index: 0,
                chrom: "chr1".to_string(),
                lines: "first\n".to_string(),
                sites: 1,
            })
            .expect("send should succeed");
    });
    let fast = thread::spawn(move || {
        sender
            .send(MergeBatchResult {
                index: 1,
                chrom: "chr1".to_string(),
                lines: "second\n".to_string(),
                sites: 1,
            })
            .expect("send should succeed");
    });

    let mut reorder = ReorderBuffer::default();
    let mut written = Vec::new();
    for result in receiver {
        reorder.push(result);
        while let Some(ready) = reorder.pop_ready() {
            written.push(ready.index);
        }
    }
    slow.join().expect("slow sender should finish");
    fast.join().expect("fast sender should finish");

    // Batch 1 finished first but batch 0 is written first regardless.
    assert_eq!(written, vec![0, 1]);
    assert!(reorder.is_empty());
}

#[test]
fn test_slow_batch_throttles_later_submissions() {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    let cap = 2;
    let (permit_sender, permit_receiver) = crossbeam_channel::bounded::<()>(cap);
    let (sender, receiver) = crossbeam_channel::unbounded::<MergeBatchResult>();
    let submitted = Arc::new(AtomicUsize::new(0));

    // Batch 0 never completes. Every later batch must take a permit before
    // entering the pipeline, and the writer only returns permits after the
    // ordered write, so the submitter stalls at the cap.
    let submitted_counter = Arc::clone(&submitted);
    let submitter = thread::spawn(move || {
        for index in 1..50usize {
            if permit_sender.send(()).is_err() {
                return;
            }
            submitted_counter.fetch_add(1, Ordering::SeqCst);
            sender
                .send(MergeBatchResult {
                    index,
                    chrom: "chr1".to_string(),
                    lines: String::new(),
                    sites: 0,
                })
                .expect("send should succeed");
        }
    });

    thread::sleep(Duration::from_millis(100));
    let in_flight = submitted.load(Ordering::SeqCst);
    assert!(
        in_flight <= cap,
        "submitter ran {in_flight} batches ahead of the writer, cap is {cap}"
    );

    // With batch 0 missing nothing is ready, so no permit comes back and
    // the staged backlog stays at the cap.
    let mut reorder = ReorderBuffer::default();
    while let Ok(result) = receiver.try_recv() {
        reorder.push(result);
    }
    assert!(reorder.pop_ready().is_none());
    assert!(reorder.pending_len() <= cap);

    // Closing the permit channel unblocks the stalled submitter.
    drop(permit_receiver);
    submitter.join().expect("submitter should finish");
    assert_eq!(submitted.load(Ordering::SeqCst), cap);
}
