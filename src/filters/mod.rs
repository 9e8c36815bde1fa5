// SPDX-License-Identifier: MIT
//
// The filter engine. One table declares every filter the service
// offers — ordinal (the client/server wire contract), CLI flags, help
// text, family and implementation — and both the client's argument
// parser and the server's dispatcher are derived by iterating it.
//
// Point filters rewrite each pixel in place. Convolution-family filters
// additionally read an immutable copy of the pre-filter pixel array so
// neighbour reads never observe partially filtered data.

mod convolution;
mod point;

/// One horizontal stripe of the image, handed to one filter thread.
///
/// `out` covers exactly rows `[start_row, start_row + rows)` of the
/// mutable pixel array; stripes never overlap, so the threads need no
/// locking. `reference` is the unmodified pixel array and is only
/// present for the convolution family.
pub struct Stripe<'a> {
    pub out: &'a mut [u8],
    pub start_row: i32,
    pub width: i32,
    pub height: i32,
    pub stride: usize,
    pub reference: Option<&'a [u8]>,
}

/// A filter implementation: mutate one stripe.
pub type FilterFn = fn(&mut Stripe<'_>);

/// Filter family. Convolution-family filters require the reference
/// copy of the pixel array; point filters run fully in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Point,
    Convolution,
}

/// Filter identifiers. Ordinals are the wire encoding inside
/// `FilterRequest` — the table below must list the filters in exactly
/// this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FilterId {
    Identity = 0,
    BlackAndWhite,
    Red,
    Green,
    Blue,
    Cyan,
    Magenta,
    Yellow,
    Sepia,
    Invert,
    Blur,
    GaussianBlur,
    GaussianBlur5x5,
    Sharpen,
    SharpenIntense,
    EdgeDetect,
    SobelHorizontal,
    SobelVertical,
    Laplacian,
    Emboss,
    EmbossIntense,
    MotionBlur,
    MotionBlurHorizontal,
    MotionBlurVertical,
    OilPainting,
    Crosshatch,
}

impl FilterId {
    /// Decode a wire ordinal. Unknown ordinals are a client/server
    /// version skew and rejected by the worker.
    pub fn from_ordinal(ordinal: u32) -> Option<Self> {
        FILTER_TABLE.get(ordinal as usize).map(|spec| spec.id)
    }

    pub fn spec(self) -> &'static FilterSpec {
        &FILTER_TABLE[self as u32 as usize]
    }
}

/// One row of the filter table.
pub struct FilterSpec {
    pub id: FilterId,
    pub short_flag: &'static str,
    pub long_flag: &'static str,
    pub description: &'static str,
    pub kind: FilterKind,
    pub run: FilterFn,
}

/// The single source of truth: point filters first, then the
/// convolution family, in wire-ordinal order.
pub const FILTER_TABLE: &[FilterSpec] = &[
    FilterSpec {
        id: FilterId::Identity,
        short_flag: "id",
        long_flag: "identity",
        description: "Apply no filter to the image",
        kind: FilterKind::Point,
        run: point::identity,
    },
    FilterSpec {
        id: FilterId::BlackAndWhite,
        short_flag: "bw",
        long_flag: "blackAndWhite",
        description: "Apply a black and white filter to the image",
        kind: FilterKind::Point,
        run: point::black_and_white,
    },
    FilterSpec {
        id: FilterId::Red,
        short_flag: "r",
        long_flag: "red",
        description: "Keep only red channel",
        kind: FilterKind::Point,
        run: point::red,
    },
    FilterSpec {
        id: FilterId::Green,
        short_flag: "g",
        long_flag: "green",
        description: "Keep only green channel",
        kind: FilterKind::Point,
        run: point::green,
    },
    FilterSpec {
        id: FilterId::Blue,
        short_flag: "b",
        long_flag: "blue",
        description: "Keep only blue channel",
        kind: FilterKind::Point,
        run: point::blue,
    },
    FilterSpec {
        id: FilterId::Cyan,
        short_flag: "c",
        long_flag: "cyan",
        description: "Keep cyan (blue + green)",
        kind: FilterKind::Point,
        run: point::cyan,
    },
    FilterSpec {
        id: FilterId::Magenta,
        short_flag: "m",
        long_flag: "magenta",
        description: "Keep magenta (red + blue)",
        kind: FilterKind::Point,
        run: point::magenta,
    },
    FilterSpec {
        id: FilterId::Yellow,
        short_flag: "y",
        long_flag: "yellow",
        description: "Keep yellow (red + green)",
        kind: FilterKind::Point,
        run: point::yellow,
    },
    FilterSpec {
        id: FilterId::Sepia,
        short_flag: "sep",
        long_flag: "sepia",
        description: "Apply sepia tone effect",
        kind: FilterKind::Point,
        run: point::sepia,
    },
    FilterSpec {
        id: FilterId::Invert,
        short_flag: "inv",
        long_flag: "invert",
        description: "Invert all colors (negative)",
        kind: FilterKind::Point,
        run: point::invert,
    },
    FilterSpec {
        id: FilterId::Blur,
        short_flag: "bl",
        long_flag: "blur",
        description: "Apply a box blur filter (3x3)",
        kind: FilterKind::Convolution,
        run: convolution::box_blur,
    },
    FilterSpec {
        id: FilterId::GaussianBlur,
        short_flag: "gb",
        long_flag: "gaussian-blur",
        description: "Apply a gaussian blur filter (3x3)",
        kind: FilterKind::Convolution,
        run: convolution::gaussian_blur,
    },
    FilterSpec {
        id: FilterId::GaussianBlur5x5,
        short_flag: "gb5",
        long_flag: "gaussian-blur-5x5",
        description: "Apply a strong gaussian blur (5x5)",
        kind: FilterKind::Convolution,
        run: convolution::gaussian_blur_5x5,
    },
    FilterSpec {
        id: FilterId::Sharpen,
        short_flag: "sh",
        long_flag: "sharpen",
        description: "Apply a sharpen filter",
        kind: FilterKind::Convolution,
        run: convolution::sharpen,
    },
    FilterSpec {
        id: FilterId::SharpenIntense,
        short_flag: "shi",
        long_flag: "sharpen-intense",
        description: "Apply an intense sharpen filter",
        kind: FilterKind::Convolution,
        run: convolution::sharpen_intense,
    },
    FilterSpec {
        id: FilterId::EdgeDetect,
        short_flag: "ed",
        long_flag: "edge-detect",
        description: "Apply edge detection",
        kind: FilterKind::Convolution,
        run: convolution::edge_detect,
    },
    FilterSpec {
        id: FilterId::SobelHorizontal,
        short_flag: "soh",
        long_flag: "sobel-horizontal",
        description: "Apply Sobel horizontal edge detection",
        kind: FilterKind::Convolution,
        run: convolution::sobel_horizontal,
    },
    FilterSpec {
        id: FilterId::SobelVertical,
        short_flag: "sov",
        long_flag: "sobel-vertical",
        description: "Apply Sobel vertical edge detection",
        kind: FilterKind::Convolution,
        run: convolution::sobel_vertical,
    },
    FilterSpec {
        id: FilterId::Laplacian,
        short_flag: "lap",
        long_flag: "laplacian",
        description: "Apply Laplacian edge detection",
        kind: FilterKind::Convolution,
        run: convolution::laplacian,
    },
    FilterSpec {
        id: FilterId::Emboss,
        short_flag: "em",
        long_flag: "emboss",
        description: "Apply an emboss effect",
        kind: FilterKind::Convolution,
        run: convolution::emboss,
    },
    FilterSpec {
        id: FilterId::EmbossIntense,
        short_flag: "emi",
        long_flag: "emboss-intense",
        description: "Apply an intense emboss effect",
        kind: FilterKind::Convolution,
        run: convolution::emboss_intense,
    },
    FilterSpec {
        id: FilterId::MotionBlur,
        short_flag: "mb",
        long_flag: "motion-blur",
        description: "Apply diagonal motion blur",
        kind: FilterKind::Convolution,
        run: convolution::motion_blur,
    },
    FilterSpec {
        id: FilterId::MotionBlurHorizontal,
        short_flag: "mbh",
        long_flag: "motion-blur-horizontal",
        description: "Apply horizontal motion blur",
        kind: FilterKind::Convolution,
        run: convolution::motion_blur_horizontal,
    },
    FilterSpec {
        id: FilterId::MotionBlurVertical,
        short_flag: "mbv",
        long_flag: "motion-blur-vertical",
        description: "Apply vertical motion blur",
        kind: FilterKind::Convolution,
        run: convolution::motion_blur_vertical,
    },
    FilterSpec {
        id: FilterId::OilPainting,
        short_flag: "oil",
        long_flag: "oil-painting",
        description: "Apply oil painting effect",
        kind: FilterKind::Convolution,
        run: convolution::oil_painting,
    },
    FilterSpec {
        id: FilterId::Crosshatch,
        short_flag: "ch",
        long_flag: "crosshatch",
        description: "Apply crosshatch drawing effect",
        kind: FilterKind::Convolution,
        run: convolution::crosshatch,
    },
];

/// Resolve a CLI flag (`-bw` or `--blackAndWhite` form, prefix
/// included) against the table.
pub fn spec_by_flag(arg: &str) -> Option<&'static FilterSpec> {
    FILTER_TABLE.iter().find(|spec| {
        arg.strip_prefix("--")
            .map(|long| long == spec.long_flag)
            .or_else(|| arg.strip_prefix('-').map(|short| short == spec.short_flag))
            .unwrap_or(false)
    })
}
