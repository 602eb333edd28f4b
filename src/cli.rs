use clap::ValueEnum;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    Modelscope,
    Huggingface,
}

impl Provider {
    /// Branch a repository is published on when no revision is given.
    pub fn default_revision(self) -> &'static str {
        match self {
            Provider::Modelscope => "master",
            Provider::Huggingface => "main",
        }
    }
}
