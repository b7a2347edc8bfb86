//! Image layout properties and their CSS rendering.
//!
//! Every image carries pixel offsets, a scale multiplier, a z-index and
//! two keywords (layout, text wrap). The keywords map to fixed CSS class
//! combinations; offsets and scale render as an inline style. Position is
//! written once per drag, on release.

use serde::{Deserialize, Serialize};

/// Layout keyword controlling how an image sits in chapter text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageLayout {
    /// In the text flow, baseline aligned.
    Inline,
    /// Own block with vertical margins.
    Block,
    /// Floated left, text flows on the right.
    FloatLeft,
    /// Floated right, text flows on the left.
    FloatRight,
    /// Centered block.
    Center,
    /// Stretched to the full column width.
    FullWidth,
}

impl ImageLayout {
    /// Database text representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageLayout::Inline => "inline",
            ImageLayout::Block => "block",
            ImageLayout::FloatLeft => "float-left",
            ImageLayout::FloatRight => "float-right",
            ImageLayout::Center => "center",
            ImageLayout::FullWidth => "full-width",
        }
    }

    /// Parse from database text, defaulting to inline.
    pub fn parse(s: &str) -> Self {
        match s {
            "block" => ImageLayout::Block,
            "float-left" => ImageLayout::FloatLeft,
            "float-right" => ImageLayout::FloatRight,
            "center" => ImageLayout::Center,
            "full-width" => ImageLayout::FullWidth,
            _ => ImageLayout::Inline,
        }
    }

    /// Fixed CSS class combination for this keyword.
    pub fn css_classes(&self) -> &'static str {
        match self {
            ImageLayout::Inline => "inline-block align-middle",
            ImageLayout::Block => "block my-4",
            ImageLayout::FloatLeft => "float-left mr-4 mb-2",
            ImageLayout::FloatRight => "float-right ml-4 mb-2",
            ImageLayout::Center => "block mx-auto my-4",
            ImageLayout::FullWidth => "block w-full my-4",
        }
    }
}

impl Default for ImageLayout {
    fn default() -> Self {
        ImageLayout::Inline
    }
}

/// Text wrap keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextWrap {
    /// Text does not wrap; clears both sides.
    None,
    /// Text wraps around the image.
    Wrap,
    /// Text breaks below the image.
    Break,
    /// Tight wrap.
    Tight,
}

impl TextWrap {
    /// Database text representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TextWrap::None => "none",
            TextWrap::Wrap => "wrap",
            TextWrap::Break => "break",
            TextWrap::Tight => "tight",
        }
    }

    /// Parse from database text, defaulting to none.
    pub fn parse(s: &str) -> Self {
        match s {
            "wrap" => TextWrap::Wrap,
            "break" => TextWrap::Break,
            "tight" => TextWrap::Tight,
            _ => TextWrap::None,
        }
    }

    /// CSS class for this keyword: wrapping keywords clear nothing,
    /// non-wrapping keywords clear both sides.
    pub fn css_class(&self) -> &'static str {
        match self {
            TextWrap::None | TextWrap::Break => "clear-both",
            TextWrap::Wrap | TextWrap::Tight => "clear-none",
        }
    }
}

impl Default for TextWrap {
    fn default() -> Self {
        TextWrap::None
    }
}

/// The mutable layout properties of an image, as one value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutProps {
    /// Horizontal pixel offset.
    pub position_x: f64,
    /// Vertical pixel offset.
    pub position_y: f64,
    /// Scale multiplier.
    pub scale: f64,
    /// Stacking order.
    pub z_index: i64,
    /// Layout keyword.
    pub layout: ImageLayout,
    /// Text wrap keyword.
    pub text_wrap: TextWrap,
}

impl Default for LayoutProps {
    /// The state of a freshly uploaded image: origin position, unit
    /// scale, inline layout, no wrap, zero z-index.
    fn default() -> Self {
        Self {
            position_x: 0.0,
            position_y: 0.0,
            scale: 1.0,
            z_index: 0,
            layout: ImageLayout::Inline,
            text_wrap: TextWrap::None,
        }
    }
}

impl LayoutProps {
    /// Apply the reset operation: all six properties return to the
    /// defaults in one update, regardless of prior values.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Inline CSS for the numeric properties.
    pub fn inline_style(&self) -> String {
        format!(
            "transform: translate({}px, {}px) scale({}); z-index: {};",
            self.position_x, self.position_y, self.scale, self.z_index
        )
    }

    /// Full class string for the keyword properties.
    pub fn css_classes(&self) -> String {
        format!("{} {}", self.layout.css_classes(), self.text_wrap.css_class())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn layout_keywords_round_trip() {
        for layout in [
            ImageLayout::Inline,
            ImageLayout::Block,
            ImageLayout::FloatLeft,
            ImageLayout::FloatRight,
            ImageLayout::Center,
            ImageLayout::FullWidth,
        ] {
            assert_eq!(ImageLayout::parse(layout.as_str()), layout);
        }
        assert_eq!(ImageLayout::parse("garbage"), ImageLayout::Inline);
    }

    #[test]
    fn css_mapping_is_fixed() {
        assert_eq!(ImageLayout::FloatLeft.css_classes(), "float-left mr-4 mb-2");
        assert_eq!(ImageLayout::Center.css_classes(), "block mx-auto my-4");
        assert_eq!(ImageLayout::FullWidth.css_classes(), "block w-full my-4");
        assert_eq!(TextWrap::None.css_class(), "clear-both");
        assert_eq!(TextWrap::Wrap.css_class(), "clear-none");
    }

    fn arb_layout() -> impl Strategy<Value = ImageLayout> {
        prop_oneof![
            Just(ImageLayout::Inline),
            Just(ImageLayout::Block),
            Just(ImageLayout::FloatLeft),
            Just(ImageLayout::FloatRight),
            Just(ImageLayout::Center),
            Just(ImageLayout::FullWidth),
        ]
    }

    fn arb_wrap() -> impl Strategy<Value = TextWrap> {
        prop_oneof![
            Just(TextWrap::None),
            Just(TextWrap::Wrap),
            Just(TextWrap::Break),
            Just(TextWrap::Tight),
        ]
    }

    proptest! {
        #[test]
        fn reset_ignores_prior_state(
            x in -5000.0f64..5000.0,
            y in -5000.0f64..5000.0,
            scale in 0.01f64..20.0,
            z in -100i64..100,
            layout in arb_layout(),
            wrap in arb_wrap(),
        ) {
            let mut props = LayoutProps {
                position_x: x,
                position_y: y,
                scale,
                z_index: z,
                layout,
                text_wrap: wrap,
            };

            props.reset();
            prop_assert_eq!(props.position_x, 0.0);
            prop_assert_eq!(props.position_y, 0.0);
            prop_assert_eq!(props.scale, 1.0);
            prop_assert_eq!(props.z_index, 0);
            prop_assert_eq!(props.layout, ImageLayout::Inline);
            prop_assert_eq!(props.text_wrap, TextWrap::None);
        }
    }
}
