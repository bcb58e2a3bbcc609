//! Progress output and outcome aggregation.
//!
//! Requests are echoed on stdout prefixed with `>>`, results with `<<`, and
//! listing entries with `>>>>`. Caught failures go to stderr and flip the
//! exit code to 1; per-node script failures are printed as results and leave
//! the exit code alone.

use std::fmt::Display;
use std::io::{self, Write};

use crate::gateway::{Image, Node, NodeResults};

/// Receives progress from the lifecycle orchestrator as an action runs.
pub trait Progress {
    /// Echoes a request line.
    fn announce(&mut self, request: &str);

    /// Reports a freshly created node.
    fn node_created(&mut self, node: &Node);

    /// Reports the per-node results of one script dispatch.
    fn script_results(&mut self, results: &NodeResults);

    /// Reports nodes moved by a lifecycle transition.
    fn transitioned(&mut self, verb: &str, nodes: &[Node]);

    /// Reports the image catalogue.
    fn images(&mut self, images: &[Image]);

    /// Reports the node listing.
    fn nodes(&mut self, nodes: &[Node]);
}

/// Writes progress to `out` and diagnostics to `err`, tracking the exit code.
#[derive(Debug)]
pub struct Reporter<O, E> {
    out: O,
    err: E,
    exit_code: i32,
}

impl Reporter<io::Stdout, io::Stderr> {
    /// Reporter bound to the process streams.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }
}

impl<O: Write, E: Write> Reporter<O, E> {
    /// Creates a reporter over arbitrary writers. The exit code starts at 0.
    #[must_use]
    pub const fn new(out: O, err: E) -> Self {
        Self {
            out,
            err,
            exit_code: 0,
        }
    }

    /// Records a caught failure: prints the diagnostic and sets the exit
    /// code to 1.
    pub fn record_failure(&mut self, failure: &impl Display) {
        self.exit_code = 1;
        writeln!(self.err, "{failure}").ok();
    }

    /// Exit code accumulated so far.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Returns the underlying writers.
    pub fn into_parts(self) -> (O, E) {
        (self.out, self.err)
    }

    fn line(&mut self, args: std::fmt::Arguments<'_>) {
        writeln!(self.out, "{args}").ok();
    }
}

fn node_list(nodes: &[Node]) -> String {
    let rendered = nodes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{rendered}]")
}

impl<O: Write, E: Write> Progress for Reporter<O, E> {
    fn announce(&mut self, request: &str) {
        self.line(format_args!(">> {request}"));
    }

    fn node_created(&mut self, node: &Node) {
        self.line(format_args!("<< node {}: {}", node.id, node.address_list()));
    }

    fn script_results(&mut self, results: &NodeResults) {
        for result in results.iter() {
            self.line(format_args!(
                "<< node {}: {}",
                result.node.id,
                result.node.address_list()
            ));
            self.line(format_args!("<<     {}", result.outcome));
        }
    }

    fn transitioned(&mut self, verb: &str, nodes: &[Node]) {
        self.line(format_args!("<< {verb} nodes {}", node_list(nodes)));
    }

    fn images(&mut self, images: &[Image]) {
        self.line(format_args!(">> No of images {}", images.len()));
        for image in images {
            self.line(format_args!(">>>>  {image}"));
        }
    }

    fn nodes(&mut self, nodes: &[Node]) {
        self.line(format_args!(">> No of nodes/instances {}", nodes.len()));
        for node in nodes {
            self.line(format_args!(">>>>  {node}"));
        }
    }
}
