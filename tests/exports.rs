//! The `extern "C"` surface generated by `export_component!`, called natively.
//!
//! Each test runs on its own thread and so gets its own runtime.
//!
//! Run with: cargo test --test exports

use pretty_assertions::assert_eq;
use spark_wasm::layout::LAYOUT_WORDS;
use spark_wasm::{
    ArenaRef, Component, DecodedPayload, ELEMENT_LAYOUT, ElementRef, Handle, Result, RuntimeConfig, Ui,
};

#[derive(Default)]
struct Counter {
    count: u32,
    label: String,
}

impl Component for Counter {
    fn render<'r>(&self, ui: &Ui<'r, Self>) -> Result<ElementRef<'r>> {
        let title = ui.text_element("h1", ui.format(format_args!("{}: {}", self.label, self.count))?)?; // 0
        let inc = ui.button("+", |counter: &mut Counter| counter.count += 1)?; // 1
        let name = ui.input("Label", |counter: &mut Counter, text| counter.label = text.to_string())?; // 2
        ui.element("main", &[title, inc, name]) // 3
    }
}

spark_wasm::export_component!(
    Counter,
    RuntimeConfig::default()
        .with_arena_capacity(16 * 1024)
        .with_input_buffer_capacity(64)
        .with_log_filter("warn")
);

use spark_exports::*;

const TITLE: u32 = 0;
const INC: u32 = 1;
const NAME: u32 = 2;

fn title_text(root: u32) -> String {
    with_runtime(|rt| {
        let tree = rt.decode(ArenaRef::from_raw(root))?;
        Ok(tree.find(TITLE).and_then(|title| title.text.clone()).unwrap_or_default())
    })
}

/// Write NUL-terminated text where the host would.
fn write_input(text: &str) -> *const u8 {
    let buffer = get_input_buffer();
    assert!(text.len() < get_input_buffer_capacity() as usize);
    // SAFETY: the buffer holds `get_input_buffer_capacity()` bytes.
    unsafe {
        std::ptr::copy_nonoverlapping(text.as_ptr(), buffer, text.len());
        buffer.add(text.len()).write(0);
    }
    buffer
}

#[test]
fn test_layout_words_exported() {
    let words = get_element_layout();
    // SAFETY: the descriptor is a static of LAYOUT_WORDS words.
    let words = unsafe { std::slice::from_raw_parts(words, LAYOUT_WORDS) };
    assert_eq!(words, ELEMENT_LAYOUT.as_words());
    assert_eq!(get_layout_word_size(), 4);
    assert_eq!(get_layout_version(), words[0]);
}

#[test]
fn test_render_then_click() {
    let root = render_component();
    assert_eq!(title_text(root), ": 0");
    let generation = get_render_generation();

    invoke_on_click(INC);
    invoke_on_click_generation(INC, generation);
    let root = render_component();
    assert_eq!(title_text(root), ": 2");
    assert_eq!(get_render_generation(), generation + 1);

    let stats = with_runtime(|rt| Ok(rt.stats()));
    assert_eq!(stats.dispatched, 2);
    assert_eq!(stats.render_requests, 2);
}

#[test]
fn test_change_through_input_buffer() {
    render_component();
    let text = write_input("clicks");
    // SAFETY: `text` is NUL-terminated inside the input buffer.
    unsafe { invoke_on_change(NAME, text) };

    let (label, staged) = with_runtime(|rt| Ok((rt.component().label.clone(), rt.input().staged().to_string())));
    assert_eq!(label, "clicks");
    assert_eq!(staged, "clicks");

    let root = render_component();
    assert_eq!(title_text(root), "clicks: 0");

    let generation = get_render_generation();
    let text = write_input("taps");
    // SAFETY: as above.
    unsafe { invoke_on_change_generation(NAME, generation, text) };
    assert_eq!(with_runtime(|rt| Ok(rt.component().label.clone())), "taps");
}

#[test]
fn test_click_on_text_is_ignored() {
    render_component();
    invoke_on_click(TITLE);
    let stats = with_runtime(|rt| Ok(rt.stats()));
    assert_eq!(stats.ignored, 1);
    assert_eq!(stats.render_requests, 0);
}

#[test]
fn test_arena_base_points_at_tree() {
    let root = render_component();
    let base = get_arena_base();
    let layout = ELEMENT_LAYOUT;
    // SAFETY: the root record lies inside the arena; fields are 4-byte aligned.
    let kind = unsafe { base.add((root + layout.kind) as usize).cast::<u32>().read() };
    assert_eq!(kind, 0);
    let decoded = with_runtime(|rt| rt.decode(ArenaRef::from_raw(root)));
    assert_eq!(decoded.payload, DecodedPayload::Generic { tag: "main".into() });
}

#[test]
fn test_init_is_idempotent() {
    init_component();
    init_component();
    render_component();
    assert!(with_runtime(|rt| Ok(rt.flags().contains(spark_wasm::RuntimeFlags::INITIALIZED))));
}

#[test]
#[should_panic(expected = "out of range")]
fn test_out_of_range_traps() {
    render_component();
    with_runtime(|rt| rt.dispatch_click(rt.handle(99)));
}

#[test]
#[should_panic(expected = "stale handle")]
fn test_stale_generation_traps() {
    render_component();
    let generation = get_render_generation();
    render_component();
    with_runtime(|rt| rt.dispatch_click(Handle::new(INC, generation)));
}
