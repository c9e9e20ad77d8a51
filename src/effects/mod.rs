pub mod reactive;

pub use reactive::{
    dominant_pitch, Channel, CueListener, CueNotice, NullListener, ReactiveChannel, ReactiveParameterEngine, ReactiveParameters,
    SectionMood, SegmentMapping,
};
