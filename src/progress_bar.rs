use indicatif::{MultiProgress, ProgressStyle};

pub struct ProgressBar {
    inner: indicatif::ProgressBar,
}

impl ProgressBar {
    pub fn new(multi_progress: MultiProgress, prefix: &str, len: usize) -> Self {
        let style = ProgressStyle::with_template(
            "{prefix:.bold} {bar:40.cyan/blue} {pos}/{len} {wide_msg:.dim}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");

        let inner = multi_progress.add(indicatif::ProgressBar::new(len as u64));
        inner.set_style(style);
        inner.set_prefix(prefix.to_string());

        Self { inner }
    }

    pub fn set_msg(&self, msg: &str) {
        self.inner.set_message(msg.to_string());
    }

    pub fn inc(&self, delta: u64) {
        self.inner.inc(delta);
    }

    pub fn finish(&self) {
        self.inner.finish_and_clear();
    }
}
