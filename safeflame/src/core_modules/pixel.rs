// THEORY (1D Pixel Heuristics):
// The `Pixel` module is the most fundamental unit of the hazard engine. It is a
// "dumb" data container for a single RGBA pixel plus the handful of single-pixel
// measures the signal extractor thresholds against: hue, saturation and value in
// the 8-bit convention used by common vision toolkits, and Rec. 601 grayscale.
//
// The 8-bit HSV convention:
// - Hue is stored in half-degrees, 0..180, so it fits in a byte.
// - Saturation and value are 0..255.
// Flame and smoke color bands are written in this scale, so keeping the same
// convention here means a band reads the same in configuration as it does in code.
//
// Key principles:
// 1) Single-pixel scope (1D): nothing here reads neighbors or history. Masks,
//    morphology and edges live in `mask` and `edges`.
// 2) Cheap: every measure is a handful of integer/float ops, no lookups.

pub mod pixel {
    pub type Channel = u8;
    pub type Hue = u8;
    pub type Saturation = u8;
    pub type Value = u8;
    pub type Gray = u8;

    /// A "dumb" data container representing a single RGBA pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Pixel {
        /// The red channel value (0-255).
        pub red: Channel,
        /// The green channel value (0-255).
        pub green: Channel,
        /// The blue channel value (0-255).
        pub blue: Channel,
        /// The alpha (transparency) channel value (0-255). Ignored by every heuristic.
        pub alpha: Channel,
    }

    /// A pixel expressed in 8-bit HSV (hue in half-degrees).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Hsv {
        pub hue: Hue,
        pub saturation: Saturation,
        pub value: Value,
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel, alpha: Channel) -> Self {
            Self { red, green, blue, alpha }
        }

        pub fn rgb(red: Channel, green: Channel, blue: Channel) -> Self {
            Self::new(red, green, blue, 255)
        }

        /// HSV value: the brightest channel.
        pub fn value(&self) -> Value {
            self.red.max(self.green).max(self.blue)
        }

        /// HSV saturation scaled to 0..255. Zero for black and for pure grays.
        pub fn saturation(&self) -> Saturation {
            let max = self.value() as f32;
            if max <= 0.0 {
                return 0;
            }
            let min = self.red.min(self.green).min(self.blue) as f32;
            (255.0 * (max - min) / max).round() as Saturation
        }

        /// Hue in half-degrees [0, 180).
        ///
        /// - Same sector math as a full-circle hue, halved at the end.
        /// - Achromatic pixels report 0.
        pub fn hue(&self) -> Hue {
            let red = self.red as f32;
            let green = self.green as f32;
            let blue = self.blue as f32;
            let maximum_channel = red.max(green).max(blue);
            let minimum_channel = red.min(green).min(blue);
            let chroma = maximum_channel - minimum_channel;

            if chroma <= 1e-6 {
                return 0;
            }

            let (base_difference, sector_offset) = if maximum_channel == red {
                (green - blue, 0.0)
            } else if maximum_channel == green {
                (blue - red, 2.0)
            } else {
                (red - green, 4.0)
            };

            let mut hue_degrees = (base_difference / chroma + sector_offset) * 60.0;
            if hue_degrees < 0.0 {
                hue_degrees += 360.0;
            }
            ((hue_degrees / 2.0).round() as u32 % 180) as Hue
        }

        pub fn hsv(&self) -> Hsv {
            Hsv {
                hue: self.hue(),
                saturation: self.saturation(),
                value: self.value(),
            }
        }

        /// Grayscale intensity (Rec. 601 luma), rounded to a byte.
        pub fn gray(&self) -> Gray {
            (0.299_f32 * self.red as f32 + 0.587_f32 * self.green as f32 + 0.114_f32 * self.blue as f32)
                .round()
                .clamp(0.0, 255.0) as Gray
        }
    }

    impl From<image::Rgba<u8>> for Pixel {
        fn from(rgba: image::Rgba<u8>) -> Self {
            let [red, green, blue, alpha] = rgba.0;
            Pixel::new(red, green, blue, alpha)
        }
    }
}
