//! Lowering pipeline
//!
//! Runs the AST passes in their fixed order: constant folding, function
//! inlining, loop unrolling. Which passes are registered depends on the
//! optimization level.

use log::debug;
use serde::Serialize;

use crate::config::CompileOptions;
use crate::frontend::ast::Program;
use crate::middle::fold;
use crate::middle::inline::FunctionInliner;
use crate::middle::unroll::LoopUnroller;
use crate::utils::Result;

/// Counters reported by the lowering passes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassStats {
    pub functions_inlined: usize,
    pub calls_inlined: usize,
    pub loops_unrolled: usize,
    pub iterations_emitted: usize,
}

/// Optimization pass trait
pub trait OptimizationPass {
    /// Name of the optimization pass
    fn name(&self) -> &'static str;

    /// Run the pass on a whole program
    fn run_on_program(&mut self, program: &mut Program, stats: &mut PassStats) -> Result<()>;
}

/// The optimizer - runs lowering passes in registration order
pub struct Optimizer {
    passes: Vec<Box<dyn OptimizationPass + Send>>,
}

impl Optimizer {
    /// An optimizer with no passes
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// The standard pipeline for `options`
    pub fn for_options(options: &CompileOptions) -> Self {
        let mut opt = Self::new();
        let folding = options.folding_enabled();
        if folding {
            opt.add_pass(Box::new(ConstantFolding));
        }
        if options.inlining_enabled() {
            opt.add_pass(Box::new(Inlining { fold: folding }));
        }
        // the target has no loops, so unrolling is not optional
        opt.add_pass(Box::new(Unrolling {
            max_iterations: options.max_loop_iterations,
        }));
        opt
    }

    /// Add an optimization pass
    pub fn add_pass(&mut self, pass: Box<dyn OptimizationPass + Send>) {
        self.passes.push(pass);
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Run all passes; the first failing pass aborts the pipeline
    pub fn optimize(&mut self, program: &mut Program) -> Result<PassStats> {
        let mut stats = PassStats::default();
        for pass in &mut self.passes {
            debug!("running pass {}", pass.name());
            pass.run_on_program(program, &mut stats)?;
        }
        Ok(stats)
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::for_options(&CompileOptions::default())
    }
}

// ==================== Constant Folding ====================

/// Folds literal subexpressions and removes statically dead branches
pub struct ConstantFolding;

impl OptimizationPass for ConstantFolding {
    fn name(&self) -> &'static str {
        "constant-folding"
    }

    fn run_on_program(&mut self, program: &mut Program, _stats: &mut PassStats) -> Result<()> {
        program.body = fold::fold_stmts(std::mem::take(&mut program.body));
        Ok(())
    }
}

// ==================== Function Inlining ====================

/// Expands calls to inline functions
pub struct Inlining {
    /// Refold substituted expressions
    pub fold: bool,
}

impl OptimizationPass for Inlining {
    fn name(&self) -> &'static str {
        "function-inlining"
    }

    fn run_on_program(&mut self, program: &mut Program, stats: &mut PassStats) -> Result<()> {
        let mut inliner = FunctionInliner::new(self.fold);
        inliner.run(program)?;
        stats.functions_inlined += inliner.functions_inlined();
        stats.calls_inlined += inliner.calls_inlined();
        Ok(())
    }
}

// ==================== Loop Unrolling ====================

/// Flattens `for` loops over statically known collections
pub struct Unrolling {
    pub max_iterations: usize,
}

impl OptimizationPass for Unrolling {
    fn name(&self) -> &'static str {
        "loop-unrolling"
    }

    fn run_on_program(&mut self, program: &mut Program, stats: &mut PassStats) -> Result<()> {
        let mut unroller = LoopUnroller::new(self.max_iterations);
        unroller.run(program)?;
        stats.loops_unrolled += unroller.loops_unrolled();
        stats.iterations_emitted += unroller.iterations();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::{Expr, Literal, Stmt};
    use crate::frontend::parser::parse;

    #[test]
    fn test_pipeline_by_level() {
        let names = Optimizer::for_options(&CompileOptions::default()).pass_names();
        assert_eq!(names, vec!["constant-folding", "function-inlining", "loop-unrolling"]);

        let options = CompileOptions { opt_level: 4, ..Default::default() };
        assert_eq!(
            Optimizer::for_options(&options).pass_names(),
            vec!["constant-folding", "loop-unrolling"]
        );

        let options = CompileOptions { opt_level: 0, ..Default::default() };
        assert_eq!(Optimizer::for_options(&options).pass_names(), vec!["loop-unrolling"]);
    }

    #[test]
    fn test_stats() {
        let mut program = parse(
            "function sq(a) { \"inline\"; return a * a; }\n\
             for (x of [1..4]) { print(sq(x)); }",
            0,
        )
        .unwrap();
        let stats = Optimizer::default().optimize(&mut program).unwrap();
        assert_eq!(stats.functions_inlined, 1);
        assert_eq!(stats.loops_unrolled, 1);
        assert_eq!(stats.iterations_emitted, 4);
        assert!(matches!(
            &program.body[3],
            Stmt::Output { args, .. } if matches!(args[0], Expr::Literal(Literal::Int(16, _)))
        ));
    }
}
