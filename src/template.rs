//! Command templates for the `run` subcommand.
//!
//! A template is the list of ffmpeg arguments given on the command line. The
//! standalone tokens `{input}` and `{output}` mark where the stdin and stdout
//! pipes go; any other `{name}` is replaced from a [`TemplateContext`].

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use ffpipe_av::{Arguments, PipeSink, PipeSource};

pub const INPUT_PLACEHOLDER: &str = "{input}";
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Variable substitution context for command templates.
///
/// # Example
///
/// ```
/// use ffpipe::template::TemplateContext;
///
/// let ctx = TemplateContext::new().with_var("crf", "23");
/// assert_eq!(ctx.substitute("crf={crf}"), "crf=23");
/// ```
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    vars: HashMap<String, String>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.vars.insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|s| s.as_str())
    }

    /// Parse a `key=value` assignment as given to `--var`.
    pub fn parse_assignment(assignment: &str) -> Result<(String, String)> {
        match assignment.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => anyhow::bail!("invalid variable '{}': expected KEY=VALUE", assignment),
        }
    }

    /// Substitute `{varname}` occurrences. Unknown names are left as-is.
    pub fn substitute(&self, template: &str) -> String {
        let mut result = template.to_string();
        for (key, value) in &self.vars {
            result = result.replace(&format!("{{{}}}", key), value);
        }
        result
    }
}

/// An ffmpeg argument list with pipe placeholders.
#[derive(Debug, Clone)]
pub struct CommandTemplate {
    tokens: Vec<String>,
}

impl CommandTemplate {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    pub fn uses(&self, placeholder: &str) -> bool {
        self.tokens.iter().any(|t| t == placeholder)
    }

    /// Build the argument list.
    ///
    /// A pipe whose placeholder is absent is placed at its natural position:
    /// the input pipe first, the output pipe last.
    pub fn assemble<'a, S, K>(
        &self,
        ctx: &TemplateContext,
        input: Option<S>,
        output: Option<K>,
        pipe_dir: &Path,
    ) -> Result<Arguments<'a>>
    where
        S: PipeSource + 'a,
        K: PipeSink + 'a,
    {
        let has_input = input.is_some();
        let has_output = output.is_some();
        for (placeholder, available, flag) in [
            (INPUT_PLACEHOLDER, has_input, "--stdin"),
            (OUTPUT_PLACEHOLDER, has_output, "--stdout"),
        ] {
            let count = self.tokens.iter().filter(|t| *t == placeholder).count();
            if count > 1 {
                anyhow::bail!("{} may appear only once", placeholder);
            }
            if count == 1 && !available {
                anyhow::bail!("{} is used but {} was not given", placeholder, flag);
            }
        }

        let mut input = input;
        let mut output = output;
        let mut args = Arguments::new();
        args.pipe_dir(pipe_dir);

        if !self.uses(INPUT_PLACEHOLDER) {
            if let Some(source) = input.take() {
                args.input_pipe(source)?;
            }
        }

        for token in &self.tokens {
            if token == INPUT_PLACEHOLDER {
                if let Some(source) = input.take() {
                    args.input_pipe(source)?;
                }
            } else if token == OUTPUT_PLACEHOLDER {
                if let Some(sink) = output.take() {
                    args.output_pipe(sink);
                }
            } else {
                args.arg(ctx.substitute(token));
            }
        }

        if let Some(sink) = output.take() {
            args.output_pipe(sink);
        }

        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ffpipe_av::{StreamPipeSink, StreamPipeSource};

    type Source = StreamPipeSource<&'static [u8]>;
    type Sink = StreamPipeSink<Vec<u8>>;

    fn source() -> Option<Source> {
        Some(StreamPipeSource::new(&b""[..]).with_format("matroska"))
    }

    fn sink() -> Option<Sink> {
        Some(StreamPipeSink::new(Vec::new()).with_format("nut"))
    }

    #[test]
    fn test_substitute() {
        let ctx = TemplateContext::new()
            .with_var("codec", "libx264")
            .with_var("crf", "23");
        assert_eq!(ctx.substitute("{codec}:{crf}"), "libx264:23");
        assert_eq!(ctx.substitute("{unknown}"), "{unknown}");
        assert_eq!(ctx.get("crf"), Some("23"));
    }

    #[test]
    fn test_parse_assignment() {
        let (k, v) = TemplateContext::parse_assignment("preset=slow").unwrap();
        assert_eq!((k.as_str(), v.as_str()), ("preset", "slow"));
        let (_, v) = TemplateContext::parse_assignment("vf=scale=640:-1").unwrap();
        assert_eq!(v, "scale=640:-1");
        assert!(TemplateContext::parse_assignment("novalue").is_err());
        assert!(TemplateContext::parse_assignment("=x").is_err());
    }

    #[test]
    fn placeholders_expand_to_pipe_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let template = CommandTemplate::new(["-y", "{input}", "-c", "copy", "{output}"]);
        let args = template
            .assemble(&TemplateContext::new(), source(), sink(), dir.path())
            .unwrap();

        let tokens = args.tokens();
        assert_eq!(&tokens[..4], &["-y", "-f", "matroska", "-i"]);
        assert!(tokens[4].contains("ffpipe_"));
        assert_eq!(&tokens[5..9], &["-c", "copy", "-f", "nut"]);
        assert!(tokens[9].contains("ffpipe_"));
        assert_eq!(args.pipe_count(), 2);
    }

    #[test]
    fn missing_placeholders_use_natural_positions() {
        let dir = tempfile::tempdir().unwrap();
        let template = CommandTemplate::new(["-c:v", "{codec}"]);
        let ctx = TemplateContext::new().with_var("codec", "libx265");
        let args = template.assemble(&ctx, source(), sink(), dir.path()).unwrap();

        let tokens = args.tokens();
        assert_eq!(tokens[0], "-f");
        assert_eq!(tokens[2], "-i");
        assert_eq!(&tokens[4..6], &["-c:v", "libx265"]);
        assert!(tokens.last().unwrap().contains("ffpipe_"));
    }

    #[test]
    fn placeholder_without_pipe_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let template = CommandTemplate::new(["{input}", "out.mkv"]);
        let err = template
            .assemble(&TemplateContext::new(), None::<Source>, sink(), dir.path())
            .unwrap_err();
        assert!(err.to_string().contains("--stdin"));
    }

    #[test]
    fn duplicate_placeholder_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let template = CommandTemplate::new(["{output}", "{output}"]);
        assert!(template
            .assemble(&TemplateContext::new(), None::<Source>, sink(), dir.path())
            .is_err());
    }

    #[test]
    fn plain_file_command_has_no_pipes() {
        let dir = tempfile::tempdir().unwrap();
        let template = CommandTemplate::new(["-i", "in.mkv", "out.mp4"]);
        let args = template
            .assemble(&TemplateContext::new(), None::<Source>, None::<Sink>, dir.path())
            .unwrap();
        assert_eq!(args.tokens(), &["-i", "in.mkv", "out.mp4"]);
        assert_eq!(args.pipe_count(), 0);
    }
}
