use criterion::{Criterion, black_box, criterion_group, criterion_main};
use html::{HtmlParse, HtmlWriterFilter};

const SMALL_BLOCKS: usize = 64;
const LARGE_BLOCKS: usize = 20_000;

fn make_blocks(blocks: usize) -> String {
    let mut page = String::with_capacity(blocks * 48 + 64);
    page.push_str("<!doctype html><html><body>");
    for i in 0..blocks {
        page.push_str("<div class=box id=b");
        page.push_str(&i.to_string());
        page.push_str("><span>hello</span><img src=x></div>");
    }
    page.push_str("</body></html>");
    page
}

fn make_rawtext_adversarial(bytes: usize) -> String {
    let mut body = String::with_capacity(bytes + 32);
    body.push_str("<script>");
    while body.len() < bytes {
        body.push_str("</scri");
        body.push_str("<");
        body.push_str("pt");
    }
    body.push_str("</script>");
    body
}

fn rewrite(input: &str) -> usize {
    let mut parse = HtmlParse::new();
    parse.add_filter(Box::new(HtmlWriterFilter::new(String::new())));
    parse.start_parse("http://bench.test/");
    parse.parse_text(input);
    parse.finish_parse();
    input.len()
}

fn bench_rewrite_small(c: &mut Criterion) {
    let input = make_blocks(SMALL_BLOCKS);
    c.bench_function("bench_rewrite_small", |b| {
        b.iter(|| black_box(rewrite(black_box(&input))));
    });
}

fn bench_rewrite_large(c: &mut Criterion) {
    let input = make_blocks(LARGE_BLOCKS);
    c.bench_function("bench_rewrite_large", |b| {
        b.iter(|| black_box(rewrite(black_box(&input))));
    });
}

fn bench_rewrite_chunked(c: &mut Criterion) {
    let input = make_blocks(LARGE_BLOCKS);
    let bytes = input.as_bytes();
    let chunk_sizes = [1usize, 2, 3, 7, 64, 128, 256, 1024];
    c.bench_function("bench_rewrite_chunked", |b| {
        b.iter(|| {
            let mut parse = HtmlParse::new();
            parse.add_filter(Box::new(HtmlWriterFilter::new(String::new())));
            parse.start_parse("http://bench.test/");
            let mut offset = 0usize;
            let mut size_idx = 0usize;
            while offset < bytes.len() {
                let size = chunk_sizes[size_idx % chunk_sizes.len()];
                let end = (offset + size).min(bytes.len());
                parse.parse_bytes(black_box(&bytes[offset..end]));
                parse.flush();
                offset = end;
                size_idx += 1;
            }
            parse.finish_parse();
            black_box(parse.bytes_parsed());
        });
    });
}

fn bench_rewrite_rawtext_adversarial(c: &mut Criterion) {
    let input = make_rawtext_adversarial(512 * 1024);
    c.bench_function("bench_rewrite_rawtext_adversarial", |b| {
        b.iter(|| black_box(rewrite(black_box(&input))));
    });
}

criterion_group!(
    benches,
    bench_rewrite_small,
    bench_rewrite_large,
    bench_rewrite_chunked,
    bench_rewrite_rawtext_adversarial
);
criterion_main!(benches);
