use crate::error::StyleError;
use core::fmt::{self, Display};

/// A named field that a format template can refer to, like `{base}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    /// `{base}`: the release segment, bumped if requested.
    Base,
    /// `{stage}`: the prerelease stage, or blank.
    Stage,
    /// `{revision}`: the stage revision, or blank.
    Revision,
    /// `{distance}`: commits since the matched tag.
    Distance,
    /// `{commit}`: the commit id with the configured prefix, or blank.
    Commit,
    /// `{dirty}`: `dirty` or `clean`.
    Dirty,
    /// `{tagged_metadata}`: metadata captured from the tag, or blank.
    TaggedMetadata,
    /// `{epoch}`: the epoch, or blank.
    Epoch,
    /// `{branch}`: the branch name, or blank.
    Branch,
    /// `{branch_escaped}`: the branch name with every non-alphanumeric character replaced.
    BranchEscaped,
    /// `{timestamp}`: the commit time in UTC as `%Y%m%d%H%M%S`, or blank.
    Timestamp,
    /// `{major}`: the first component of the base.
    Major,
    /// `{minor}`: the second component of the base, or blank.
    Minor,
    /// `{patch}`: the third component of the base, or blank.
    Patch,
}

impl Placeholder {
    /// Every placeholder, in documentation order.
    pub const ALL: [Placeholder; 14] = [
        Placeholder::Base,
        Placeholder::Stage,
        Placeholder::Revision,
        Placeholder::Distance,
        Placeholder::Commit,
        Placeholder::Dirty,
        Placeholder::TaggedMetadata,
        Placeholder::Epoch,
        Placeholder::Branch,
        Placeholder::BranchEscaped,
        Placeholder::Timestamp,
        Placeholder::Major,
        Placeholder::Minor,
        Placeholder::Patch,
    ];

    /// The name written between the braces.
    pub fn name(&self) -> &'static str {
        match self {
            Placeholder::Base => "base",
            Placeholder::Stage => "stage",
            Placeholder::Revision => "revision",
            Placeholder::Distance => "distance",
            Placeholder::Commit => "commit",
            Placeholder::Dirty => "dirty",
            Placeholder::TaggedMetadata => "tagged_metadata",
            Placeholder::Epoch => "epoch",
            Placeholder::Branch => "branch",
            Placeholder::BranchEscaped => "branch_escaped",
            Placeholder::Timestamp => "timestamp",
            Placeholder::Major => "major",
            Placeholder::Minor => "minor",
            Placeholder::Patch => "patch",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Placeholder::ALL.into_iter().find(|p| p.name() == name)
    }
}

impl Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FormatToken<'fs> {
    Placeholder(Placeholder),

    /// Text copied verbatim from the template. Never contains a brace.
    Literal(&'fs str),

    /// A doubled brace, `{{` or `}}`, which renders as a single one.
    Escaped(char),
}

impl<'fs> Display for FormatToken<'fs> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatToken::Placeholder(placeholder) => write!(f, "{placeholder}"),
            FormatToken::Literal(text) => f.write_str(text),
            FormatToken::Escaped(brace) => write!(f, "{brace}{brace}"),
        }
    }
}

/// A custom output template, such as `v{base}+{distance}.{commit}`.
///
/// Placeholders are names in braces (see [`Placeholder`]); `{{` and `}}` produce literal braces.
/// Templates are not checked against any [`Style`](crate::Style) unless one is requested at
/// serialization time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format<'fs> {
    pub(crate) tokens: Vec<FormatToken<'fs>>,
}

impl<'fs> Format<'fs> {
    /// Parses a template.
    ///
    /// # Errors
    ///
    /// - [`StyleError::UnknownPlaceholder`] if a placeholder name is not recognized.
    /// - [`StyleError::InvalidFormat`] if a `{` is never closed or a `}` stands alone.
    pub fn parse(template: &'fs str) -> Result<Self, StyleError> {
        let mut rest = template;
        let mut tokens = Vec::new();

        while !rest.is_empty() {
            let consume_len = if rest.starts_with("{{") {
                tokens.push(FormatToken::Escaped('{'));
                2
            } else if rest.starts_with("}}") {
                tokens.push(FormatToken::Escaped('}'));
                2
            } else if rest.starts_with('{') {
                let closing_index = rest.find('}').ok_or(StyleError::InvalidFormat {
                    reason: "expected '}' before end of string",
                })?;
                let name = &rest[1..closing_index];
                let placeholder =
                    Placeholder::from_name(name).ok_or_else(|| StyleError::UnknownPlaceholder {
                        placeholder: name.to_owned(),
                    })?;
                tokens.push(FormatToken::Placeholder(placeholder));
                closing_index + 1
            } else if rest.starts_with('}') {
                return Err(StyleError::InvalidFormat {
                    reason: "single '}' encountered in format string",
                });
            } else {
                let end = rest.find(['{', '}']).unwrap_or(rest.len());
                tokens.push(FormatToken::Literal(&rest[..end]));
                end
            };

            rest = &rest[consume_len..];
        }

        Ok(Self { tokens })
    }

    /// The placeholders used by this template, in order of appearance.
    pub fn placeholders(&self) -> impl Iterator<Item = Placeholder> + '_ {
        self.tokens.iter().filter_map(|token| match token {
            FormatToken::Placeholder(placeholder) => Some(*placeholder),
            _ => None,
        })
    }

    /// Renders the template, asking `value` for the text of each placeholder.
    pub(crate) fn render<F>(&self, mut value: F) -> String
    where
        F: FnMut(Placeholder) -> String,
    {
        let mut out = String::new();
        for token in &self.tokens {
            match token {
                FormatToken::Placeholder(placeholder) => out.push_str(&value(*placeholder)),
                FormatToken::Literal(text) => out.push_str(text),
                FormatToken::Escaped(brace) => out.push(*brace),
            }
        }
        out
    }
}

impl<'fs> Display for Format<'fs> {
    /// Displays the format as its template string.
    ///
    /// ```
    /// use dynver::Format;
    ///
    /// let template = "v{base}+{{{distance}}}";
    /// assert_eq!(template, Format::parse(template).unwrap().to_string());
    /// ```
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.tokens {
            write!(f, "{token}")?;
        }
        Ok(())
    }
}
