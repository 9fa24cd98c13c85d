//! General purpose function object over real numbers.
//!
//! A `Function` owns an expression over pushed inputs (`x0`, `x1`, ...,
//! or bare names), pulled inputs (`y0`, `y1`, ...), named constants and the
//! reserved time symbol `t`. Once configured it participates in the tick
//! loop through the [`Tickable`] lifecycle: each `process` pulls, evaluates
//! and routes the value, its derivative with respect to the independent
//! variable, or its rate of change, depending on [`Mode`].
//!
//! Configuration errors surface synchronously and flip the instance to an
//! invalid state in which both lifecycle entry points are skipped; a broken
//! function never stalls the surrounding simulation.

use crate::engine::{self, Bytecode, CellRef, Compiler, Vm};
use crate::error::{FunctionError, Result};
use crate::events::{EventLog, FunctionEvent};
use crate::solver::{FunctionId, SolverId, SolverRegistry};
use crate::store::VariableStore;
use crate::symbol::{classify, VarKind, TIME_NAME};
use crate::traits::{Ports, TickInfo, Tickable};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;

/// Output is suppressed below this value when triggering is enabled.
pub const TRIGGER_THRESHOLD: f64 = 0.0;

/// Which outputs fire each tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Value,
    Derivative,
    Rate,
    /// Value, derivative and rate all fire.
    All,
}

impl Mode {
    /// Legacy numeric configuration codes: 1 value, 2 derivative, 3 rate,
    /// anything else all three.
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => Mode::Value,
            2 => Mode::Derivative,
            3 => Mode::Rate,
            _ => Mode::All,
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Mode::Value => 1,
            Mode::Derivative => 2,
            Mode::Rate => 3,
            Mode::All => 0,
        }
    }
}

pub struct Function {
    expr: String,
    valid: bool,
    code: Option<Bytecode>,
    store: VariableStore,
    bindings: HashMap<String, CellRef>,
    constants: IndexMap<String, f64>,
    independent: Option<String>,
    mode: Mode,
    use_trigger: bool,
    do_eval_at_reinit: bool,
    allow_unknown: bool,
    value: f64,
    last_value: f64,
    rate: f64,
    events: EventLog,
    solver: Option<SolverId>,
    // Scratch buffer for the VM, reused across evaluations.
    stack: RefCell<Vec<f64>>,
}

impl Function {
    pub fn new() -> Self {
        let mut constants = IndexMap::new();
        constants.insert("pi".to_string(), std::f64::consts::PI);
        constants.insert("e".to_string(), std::f64::consts::E);
        Self {
            expr: String::new(),
            valid: true,
            code: None,
            store: VariableStore::new(),
            bindings: HashMap::new(),
            constants,
            independent: None,
            mode: Mode::default(),
            use_trigger: false,
            do_eval_at_reinit: false,
            allow_unknown: true,
            value: 0.0,
            last_value: 0.0,
            rate: 0.0,
            events: EventLog::new(),
            solver: None,
            stack: RefCell::new(Vec::with_capacity(64)),
        }
    }

    // --- configuration surface ---

    /// Set the expression text and recompile.
    ///
    /// Symbols are classified and slots allocated before compilation; a
    /// name that cannot be classified rejects the whole attempt without
    /// allocating anything. Re-setting the current text on a valid
    /// instance is a warned no-op. Slots from earlier expressions are kept,
    /// so an expression can be extended without losing pushed values.
    pub fn set_expr(&mut self, text: &str) -> Result<()> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(());
        }
        if self.valid && trimmed == self.expr {
            self.events.record(FunctionEvent::ExpressionUnchanged {
                expr: self.expr.clone(),
            });
            return Ok(());
        }
        match self.rebuild(trimmed) {
            Ok(code) => {
                self.code = Some(code);
                self.expr = trimmed.to_string();
                self.valid = true;
                Ok(())
            }
            Err(err) => {
                self.valid = false;
                self.events.record(FunctionEvent::CompileFailed {
                    expr: trimmed.to_string(),
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// The last successfully compiled expression text.
    pub fn expr(&self) -> &str {
        &self.expr
    }

    pub fn valid(&self) -> bool {
        self.valid
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn use_trigger(&self) -> bool {
        self.use_trigger
    }

    pub fn set_use_trigger(&mut self, use_trigger: bool) {
        self.use_trigger = use_trigger;
    }

    pub fn do_eval_at_reinit(&self) -> bool {
        self.do_eval_at_reinit
    }

    pub fn set_do_eval_at_reinit(&mut self, do_eval: bool) {
        self.do_eval_at_reinit = do_eval;
    }

    pub fn allow_unknown_variable(&self) -> bool {
        self.allow_unknown
    }

    pub fn set_allow_unknown_variable(&mut self, allow: bool) {
        self.allow_unknown = allow;
    }

    /// The variable differentiation is taken against. When unset, it
    /// resolves to the first bound input, falling back to time.
    pub fn independent(&self) -> Option<&str> {
        self.independent.as_deref()
    }

    pub fn set_independent(&mut self, name: &str) {
        self.independent = Some(name.to_string());
    }

    /// Define a named constant. Constants must be defined before the
    /// expression that references them; re-defining one only takes effect
    /// at the next compile, since constants are folded into the bytecode.
    pub fn set_constant(&mut self, name: &str, value: f64) {
        self.constants.insert(name.to_string(), value);
    }

    pub fn constant(&self, name: &str) -> Option<f64> {
        self.constants.get(name).copied()
    }

    // --- inputs ---

    /// Push a value into an input slot. An out-of-range index is reported
    /// on the event channel and the value dropped.
    pub fn set_input(&mut self, index: usize, value: f64) {
        if !self.store.set_input(index, value) {
            self.events
                .record(FunctionEvent::PushIndexOutOfRange { index, value });
        }
    }

    pub fn input(&self, index: usize) -> Option<f64> {
        self.store.input(index)
    }

    pub fn set_input_by_name(&mut self, name: &str, value: f64) -> bool {
        self.store.set_input_by_name(name, value)
    }

    pub fn input_by_name(&self, name: &str) -> Option<f64> {
        self.store.input_by_name(name)
    }

    /// Slot index of a bound input variable.
    pub fn var_index(&self, name: &str) -> Option<usize> {
        self.store.var_index(name)
    }

    /// Number of bound input variables (indexed and named).
    pub fn num_vars(&self) -> usize {
        self.store.num_inputs()
    }

    /// Snapshot of the pulled cells, in pull-connection order.
    pub fn pulled_values(&self) -> Vec<f64> {
        self.store.pulled().to_vec()
    }

    pub fn time(&self) -> f64 {
        self.store.time()
    }

    // --- results ---

    /// Value computed in the last tick.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Finite-difference rate across the last two ticks.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Evaluate against the current cell values without running a tick.
    /// An invalid or unconfigured instance yields 0.0.
    pub fn eval_now(&self) -> f64 {
        if !self.valid {
            return 0.0;
        }
        self.eval_raw()
    }

    /// Five-point-stencil derivative with respect to the independent
    /// variable, at the current cell values. The probed cell is restored
    /// afterward. Yields 0.0 when invalid, unconfigured, or the
    /// independent variable is not bound.
    pub fn derivative(&mut self) -> f64 {
        if !self.valid {
            return 0.0;
        }
        let Some(code) = self.code.as_ref() else {
            return 0.0;
        };
        let name = match &self.independent {
            Some(name) => name.clone(),
            None => self
                .store
                .first_input_name()
                .unwrap_or(TIME_NAME)
                .to_string(),
        };
        let Some(cell) = self.bindings.get(&name).copied() else {
            self.events
                .record(FunctionEvent::UnknownIndependent { name });
            return 0.0;
        };
        let (inputs, pulled, time) = self.store.cells_mut();
        engine::differentiate(code, inputs, pulled, time, cell, &mut self.stack.borrow_mut())
    }

    // --- events ---

    pub fn events(&self) -> impl Iterator<Item = &FunctionEvent> {
        self.events.iter()
    }

    pub fn drain_events(&mut self) -> Vec<FunctionEvent> {
        self.events.drain()
    }

    // --- solver association ---

    /// Associate this function with a solver. The registry keeps the
    /// owning lookup table; the function holds only the id. Overwriting a
    /// live association without a detach is reported on the event channel.
    pub fn attach_solver(&mut self, registry: &mut SolverRegistry, id: FunctionId) {
        if self.solver != Some(registry.id()) && self.solver.is_some() {
            self.events.record(FunctionEvent::SolverReplaced);
        }
        self.solver = Some(registry.id());
        registry.attach(id);
    }

    /// Break the association and notify the registry.
    pub fn detach_solver(&mut self, registry: &mut SolverRegistry, id: FunctionId) {
        registry.notify_detach(id);
        if self.solver == Some(registry.id()) {
            self.solver = None;
        }
    }

    pub fn solver(&self) -> Option<SolverId> {
        self.solver
    }

    // --- lifecycle ---

    /// One tick: pull, evaluate, route. Skipped silently while invalid or
    /// unconfigured.
    pub fn process(&mut self, info: &TickInfo, ports: &mut dyn Ports) {
        if !self.valid || self.code.is_none() {
            return;
        }

        // Pull phase: completes fully before any cell is read.
        let pulled = ports.request_values();
        self.store.apply_pulled(&pulled);

        self.store.set_time(info.time);
        let value = self.eval_raw();
        self.value = value;
        self.rate = (value - self.last_value) / info.dt;

        if self.use_trigger && value < TRIGGER_THRESHOLD {
            self.last_value = value;
            return;
        }

        match self.mode {
            Mode::Value => ports.value_out(value),
            Mode::Derivative => {
                let derivative = self.derivative();
                ports.derivative_out(derivative);
            }
            Mode::Rate => ports.rate_out(self.rate),
            Mode::All => {
                let derivative = self.derivative();
                ports.value_out(value);
                ports.derivative_out(derivative);
                ports.rate_out(self.rate);
            }
        }
        self.last_value = value;
    }

    /// Restart at the scheduler's reported time. No pull phase happens
    /// here; pulled cells keep whatever they last held. The derivative
    /// output is always reported as 0.0 at reinit.
    pub fn reinit(&mut self, info: &TickInfo, ports: &mut dyn Ports) {
        if self.code.is_none() {
            return;
        }
        if !self.valid {
            self.events.record(FunctionEvent::ReinitSkipped {
                expr: self.expr.clone(),
            });
            return;
        }

        self.store.set_time(info.time);
        let value = if self.do_eval_at_reinit {
            self.eval_raw()
        } else {
            0.0
        };
        self.value = value;
        self.last_value = value;
        self.rate = 0.0;

        if self.use_trigger && value < TRIGGER_THRESHOLD {
            return;
        }

        match self.mode {
            Mode::Value => ports.value_out(value),
            Mode::Derivative => ports.derivative_out(0.0),
            Mode::Rate => ports.rate_out(self.rate),
            Mode::All => {
                ports.value_out(value);
                ports.derivative_out(0.0);
                ports.rate_out(self.rate);
            }
        }
    }

    // --- internals ---

    fn eval_raw(&self) -> f64 {
        match &self.code {
            Some(code) => Vm::execute(
                code,
                self.store.inputs(),
                self.store.pulled(),
                self.store.time(),
                &mut self.stack.borrow_mut(),
            ),
            None => 0.0,
        }
    }

    fn rebuild(&mut self, text: &str) -> Result<Bytecode> {
        let ast = engine::parse(text)?;
        let symbols = engine::scan_symbols(text)?;

        // Classify everything before allocating anything, so a rejected
        // name leaves no partially applied expression behind.
        let mut plan = Vec::with_capacity(symbols.len());
        for name in symbols {
            match classify(&name, self.allow_unknown, &self.constants) {
                VarKind::Unsupported => {
                    return Err(FunctionError::UnsupportedName(name));
                }
                VarKind::Constant => {
                    if !self.constants.contains_key(&name) {
                        return Err(FunctionError::UndefinedConstant(name));
                    }
                }
                kind => plan.push((name, kind)),
            }
        }
        for (name, kind) in plan {
            match kind {
                VarKind::IndexedInput(index) => self.store.add_indexed(index),
                VarKind::NamedInput => self.store.add_named(&name),
                VarKind::PulledInput(index) => self.store.add_pulled(index),
                VarKind::Time | VarKind::Constant | VarKind::Unsupported => {}
            }
        }

        self.bindings = self.build_bindings();
        let code = Compiler::new(&self.bindings).compile(&ast)?;
        Ok(code)
    }

    fn build_bindings(&self) -> HashMap<String, CellRef> {
        let mut bindings = HashMap::new();
        for (name, index) in self.store.name_indices() {
            bindings.insert(name.to_string(), CellRef::Input(index));
        }
        for index in 0..self.store.pulled_len() {
            bindings.insert(format!("y{index}"), CellRef::Pulled(index));
        }
        // Constants shadow input slots of the same name; time shadows
        // everything.
        for (name, &value) in &self.constants {
            bindings.insert(name.clone(), CellRef::Const(value));
        }
        bindings.insert(TIME_NAME.to_string(), CellRef::Time);
        bindings
    }
}

impl Default for Function {
    fn default() -> Self {
        Self::new()
    }
}

/// Duplicating a function allocates a brand-new store with matching slot
/// names and re-runs compilation. The compiled handle is never shared:
/// it holds cell bindings by slot identity, which only make sense against
/// the store they were compiled for. Slot values start fresh at zero; the
/// solver association is not carried over.
impl Clone for Function {
    fn clone(&self) -> Self {
        let mut dup = Function::new();
        dup.mode = self.mode;
        dup.use_trigger = self.use_trigger;
        dup.do_eval_at_reinit = self.do_eval_at_reinit;
        dup.allow_unknown = self.allow_unknown;
        dup.independent = self.independent.clone();
        dup.constants = self.constants.clone();
        dup.value = self.value;
        dup.last_value = self.last_value;
        dup.rate = self.rate;
        dup.store.set_time(self.store.time());

        let names: Vec<String> = self.store.input_names().map(String::from).collect();
        for name in &names {
            dup.store.add_named(name);
        }
        for index in 0..self.store.pulled_len() {
            dup.store.add_pulled(index);
        }

        dup.expr = self.expr.clone();
        dup.valid = self.valid;
        if self.valid && !self.expr.is_empty() {
            match dup.rebuild(&self.expr) {
                Ok(code) => dup.code = Some(code),
                Err(_) => dup.valid = false,
            }
        }
        dup
    }
}

impl Tickable for Function {
    fn reinit(&mut self, info: &TickInfo, ports: &mut dyn Ports) {
        Function::reinit(self, info, ports);
    }
    fn process(&mut self, info: &TickInfo, ports: &mut dyn Ports) {
        Function::process(self, info, ports);
    }
}
