//! Deck render benchmarks
//!
//! Measures the cost of the audio callback body at typical buffer sizes.

use std::sync::Arc;

use airdeck_core::{
    Action, ControlEvent, Deck, DeckConfig, GateConfig, MemorySource, RenderStatus, Session, Side,
    StreamConfig, TrackBuffer,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

/// Ten seconds of stereo, rewound whenever it runs out
fn long_deck() -> Deck {
    let track = TrackBuffer::from_fn(48000 * 10, 2, 48000, |f, c| {
        let level = if c == 0 { 1.0 } else { 0.5 };
        (f as f32 * 0.01).sin() * level
    });
    let config = DeckConfig {
        gate: GateConfig::unthrottled(),
        ..Default::default()
    };
    Deck::from_track("bench", track, Arc::new(MemorySource::new()), config)
        .expect("valid deck config")
}

fn render_looped(deck: &Deck, out: &mut [f32]) {
    if deck.render_into(out, 2) == RenderStatus::Ended {
        deck.seek(0);
        deck.toggle();
    }
}

fn benchmark_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("deck_render");

    for buffer_size in [64, 128, 256, 512, 1024].iter() {
        for speed_delta in [0.0_f32, 0.25] {
            let deck = long_deck();
            deck.toggle();
            deck.adjust_speed(speed_delta);
            let mut out = vec![0.0_f32; *buffer_size * 2];

            group.throughput(Throughput::Elements(*buffer_size as u64 * 2));
            group.bench_function(
                format!("render_{}_frames_speed_{}", buffer_size, 1.0 + speed_delta),
                |b| {
                    b.iter(|| {
                        render_looped(&deck, black_box(&mut out));
                    })
                },
            );
        }
    }

    group.finish();
}

fn benchmark_fading_render(c: &mut Criterion) {
    let deck = long_deck();
    deck.toggle();
    let mut out = vec![0.0_f32; 512 * 2];

    c.bench_function("render_512_frames_fading", |b| {
        b.iter(|| {
            if !deck.is_fading() {
                deck.fade_out();
            }
            render_looped(&deck, black_box(&mut out));
        })
    });
}

fn benchmark_control_routing(c: &mut Criterion) {
    let (sender, _receiver) = crossbeam_channel::unbounded();
    let mut session = Session::new(Arc::new(long_deck()), None, StreamConfig::default(), sender);
    let event = ControlEvent::new(Side::Left, Action::Volume(0.0));

    c.bench_function("session_volume_event", |b| {
        b.iter(|| {
            session.handle(black_box(event)).expect("volume never fails");
        })
    });
}

criterion_group!(benches, benchmark_render, benchmark_fading_render, benchmark_control_routing);
criterion_main!(benches);
