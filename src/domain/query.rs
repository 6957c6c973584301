//! Options for `find_with` and `xpath_with`.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Keep only elements whose text contains one of these (case-insensitive).
    pub containing: Vec<String>,
    /// Strip scripts, styles and event handlers from the results.
    pub clean: bool,
    /// Encoding reported by the resulting elements.
    pub encoding: Option<String>,
}

impl FindOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn containing<I, S>(mut self, needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.containing = needles.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    #[must_use]
    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XPathOptions {
    pub clean: bool,
    pub encoding: Option<String>,
}

impl XPathOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    #[must_use]
    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }
}
