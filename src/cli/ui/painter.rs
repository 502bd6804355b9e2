use owo_colors::{OwoColorize, Style as OwoStyle};

use crate::myo::DataCategory;

/// Applies colour and style to terminal text.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Painter {
    use_colour: bool,
}

impl Painter {
    pub(crate) fn new(use_colour: bool) -> Self {
        Self { use_colour }
    }

    pub(crate) fn heading<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold().cyan())
    }

    pub(crate) fn success<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold().green())
    }

    pub(crate) fn warning<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold().yellow())
    }

    pub(crate) fn muted<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().dimmed())
    }

    pub(crate) fn value<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold())
    }

    /// Labels an event line with a colour per data category.
    pub(crate) fn category(&self, category: DataCategory) -> String {
        let style = match category {
            DataCategory::Emg => OwoStyle::new().magenta(),
            DataCategory::Imu => OwoStyle::new().blue(),
            DataCategory::Pose => OwoStyle::new().bold().green(),
            DataCategory::Arm => OwoStyle::new().bold().cyan(),
            DataCategory::Battery => OwoStyle::new().yellow(),
        };
        self.paint(&format!("{:<7}", category.to_string()), style)
    }

    fn paint(&self, text: &str, style: OwoStyle) -> String {
        if self.use_colour {
            format!("{}", text.style(style))
        } else {
            text.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    use super::*;

    #[rstest]
    #[case::plain(false)]
    #[case::coloured(true)]
    fn styles_keep_the_text(#[case] use_colour: bool) {
        let painter = Painter::new(use_colour);
        for styled in [
            painter.heading("Connected"),
            painter.success("Connected"),
            painter.warning("Connected"),
            painter.muted("Connected"),
            painter.value("Connected"),
        ] {
            assert!(styled.contains("Connected"));
            assert_eq!(!use_colour, styled == "Connected");
        }
    }

    #[test]
    fn plain_category_labels_are_padded() {
        let painter = Painter::new(false);
        assert_eq!("emg    ", painter.category(DataCategory::Emg));
        assert_eq!("battery", painter.category(DataCategory::Battery));
    }

    #[test]
    fn coloured_category_labels_differ_from_plain() {
        let plain = Painter::new(false);
        let coloured = Painter::new(true);
        for category in DataCategory::iter() {
            assert_ne!(plain.category(category), coloured.category(category));
        }
    }
}
