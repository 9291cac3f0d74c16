//! Transcript fragments and the sink the console renders into.

/// Marker appended when a run starts.
pub const EXECUTION_STARTED_MARKER: &str = "--- Execution Started ---";

/// Presentation class of a transcript fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentStyle {
    ExecutionStart,
    Output,
    Error,
    ExecutionTime,
    Prompt,
    InputEcho,
    Notice,
}

impl FragmentStyle {
    /// Stable class name used when rendering to HTML.
    #[must_use]
    pub fn class_name(self) -> &'static str {
        match self {
            Self::ExecutionStart => "execution-start",
            Self::Output => "output-text",
            Self::Error => "error-text",
            Self::ExecutionTime => "execution-time",
            Self::Prompt => "prompt-text",
            Self::InputEcho => "input-echo",
            Self::Notice => "notice-text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub style: FragmentStyle,
    pub text: String,
}

impl Fragment {
    pub fn new(style: FragmentStyle, text: impl Into<String>) -> Self {
        Self {
            style,
            text: text.into(),
        }
    }

    pub fn execution_started() -> Self {
        Self::new(
            FragmentStyle::ExecutionStart,
            format!("{EXECUTION_STARTED_MARKER}\n"),
        )
    }

    /// Program output, kept verbatim.
    pub fn output(text: impl Into<String>) -> Self {
        Self::new(FragmentStyle::Output, text)
    }

    pub fn error(text: &str) -> Self {
        Self::new(FragmentStyle::Error, format!("{text}\n"))
    }

    pub fn execution_time(text: &str) -> Self {
        Self::new(FragmentStyle::ExecutionTime, format!("{text}\n"))
    }

    pub fn prompt(text: &str) -> Self {
        Self::new(FragmentStyle::Prompt, format!("{text} "))
    }

    pub fn input_echo(value: &str) -> Self {
        Self::new(FragmentStyle::InputEcho, format!("{value}\n"))
    }

    pub fn notice(text: &str) -> Self {
        Self::new(FragmentStyle::Notice, format!("{text}\n"))
    }
}

/// Destination for everything the console shows the user.
///
/// Calls arrive in transport arrival order. At most one input field is open
/// at a time; `close_input` with `None` removes it without an echo.
pub trait OutputSink {
    fn append(&mut self, fragment: Fragment);

    /// Shows `prompt` followed by an editable field.
    fn open_input(&mut self, prompt: Fragment);

    /// Replaces the open field with `echo`, or just removes it.
    fn close_input(&mut self, echo: Option<Fragment>);

    fn clear(&mut self);

    fn scroll_to_end(&mut self) {}
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Fragment(Fragment),
    /// Editable field awaiting the user's answer.
    InputField,
}

/// In-memory transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    entries: Vec<Entry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn fragments(&self) -> impl Iterator<Item = &Fragment> {
        self.entries.iter().filter_map(|entry| match entry {
            Entry::Fragment(fragment) => Some(fragment),
            Entry::InputField => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_open_input(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| matches!(entry, Entry::InputField))
    }

    /// Concatenated fragment text; an open field renders as nothing.
    pub fn to_plain_text(&self) -> String {
        self.fragments()
            .map(|fragment| fragment.text.as_str())
            .collect()
    }

    pub fn to_html(&self) -> String {
        let mut html = String::new();
        for entry in &self.entries {
            match entry {
                Entry::Fragment(fragment) => {
                    html.push_str("<span class=\"");
                    html.push_str(fragment.style.class_name());
                    html.push_str("\">");
                    html.push_str(&escape_html(&fragment.text));
                    html.push_str("</span>");
                }
                Entry::InputField => html.push_str("<input type=\"text\" class=\"console-input\">"),
            }
        }
        html
    }
}

impl OutputSink for Transcript {
    fn append(&mut self, fragment: Fragment) {
        self.entries.push(Entry::Fragment(fragment));
    }

    fn open_input(&mut self, prompt: Fragment) {
        self.entries.push(Entry::Fragment(prompt));
        self.entries.push(Entry::InputField);
    }

    fn close_input(&mut self, echo: Option<Fragment>) {
        let Some(index) = self
            .entries
            .iter()
            .rposition(|entry| matches!(entry, Entry::InputField))
        else {
            return;
        };

        match echo {
            Some(echo) => self.entries[index] = Entry::Fragment(echo),
            None => {
                self.entries.remove(index);
            }
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Escapes text for inclusion in HTML element content or attribute values.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
