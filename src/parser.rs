use crate::error::ShellError;
use crate::lexer::Token;

/// One stage of a pipeline: a program name plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub name: String,
    pub args: Vec<String>,
}

impl Segment {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Arguments as string slices, the shape the command factories take.
    pub fn arg_refs(&self) -> Vec<&str> {
        self.args.iter().map(String::as_str).collect()
    }
}

/// A non-empty chain of segments whose standard streams are connected end-to-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    segments: Vec<Segment>,
}

impl Pipeline {
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn first(&self) -> &Segment {
        // construct_pipeline never builds an empty pipeline
        &self.segments[0]
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

struct PipelineBuilder {
    tokens: std::vec::IntoIter<Token>,
    segments: Vec<Segment>,
    current: Vec<String>,
}

impl PipelineBuilder {
    fn from(tokens: Vec<Token>) -> Self {
        PipelineBuilder {
            tokens: tokens.into_iter(),
            segments: Vec::new(),
            current: Vec::new(),
        }
    }

    fn build(mut self) -> Result<Pipeline, ShellError> {
        let mut saw_any = false;

        while let Some(token) = self.tokens.next() {
            saw_any = true;
            match token {
                Token::Word(word) => self.current.push(word),
                Token::PipeOp => self.close_segment()?,
            }
        }

        if !saw_any {
            return Err(ShellError::MalformedPipeline("empty command line".to_string()));
        }
        if self.current.is_empty() {
            return Err(ShellError::MalformedPipeline(
                "missing command after `|`".to_string(),
            ));
        }
        self.close_segment()?;

        Ok(Pipeline {
            segments: self.segments,
        })
    }

    fn close_segment(&mut self) -> Result<(), ShellError> {
        let mut words = std::mem::take(&mut self.current).into_iter();
        let Some(name) = words.next() else {
            let reason = if self.segments.is_empty() {
                "missing command before `|`"
            } else {
                "empty command between `|` separators"
            };
            return Err(ShellError::MalformedPipeline(reason.to_string()));
        };
        self.segments.push(Segment::new(name, words.collect()));
        Ok(())
    }
}

/// Groups tokens into pipeline segments, splitting at every `|`.
///
/// Fails with [`ShellError::MalformedPipeline`] for an empty token stream, a leading
/// or trailing `|`, or two consecutive `|` tokens.
pub fn construct_pipeline(tokens: Vec<Token>) -> Result<Pipeline, ShellError> {
    PipelineBuilder::from(tokens).build()
}
