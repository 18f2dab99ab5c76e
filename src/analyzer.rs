//! C4: the single-pass AST walker that populates the symbol table and
//! per-function metrics (spec §4.3). Grounded on
//! `analysis/az_impl/az_visit_AssignmentStatement.cpp` (ownership flagging,
//! destructuring validation, class-member suppression) and
//! `analysis/TemporaryVariableFactory.cpp` (temporary naming/registration);
//! type inference is ported from `analysis/StatelessTypeInference.cpp`.

use crate::ast::{AllocationKind, BinaryOperator, Expression, FunctionDecl, Statement};
use crate::symbol::{FunctionMetrics, Symbol, SymbolKind, SymbolTable};
use crate::types::VarType;
use std::collections::BTreeMap;

/// A non-fatal finding recorded while walking a function body (spec §4.3
/// "emit a `PotentialMemoryLeak` warning").
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnalyzerDiagnostic {
    PotentialMemoryLeak { variable: String },
    InvalidDestructuring { expected: &'static str, lhs_count: usize },
    AssignmentToConstList { variable: String },
}

/// Walks function bodies, feeding the symbol table and metrics. One
/// `Analyzer` instance owns the whole program's analysis state, matching the
/// original `ASTAnalyzer`'s single long-lived instance per compilation.
#[derive(Default)]
pub struct Analyzer {
    pub symbol_table: SymbolTable,
    pub function_metrics: BTreeMap<String, FunctionMetrics>,
    pub diagnostics: Vec<AnalyzerDiagnostic>,
    current_function: String,
    current_class: Option<String>,
    temp_var_counter: u32,
}

impl Analyzer {
    pub fn new() -> Self {
        Analyzer {
            current_function: "Global".to_string(),
            ..Default::default()
        }
    }

    /// Infers an expression's type without mutating any AST node (ported
    /// from `StatelessTypeInference::infer_expression_type`).
    pub fn infer_expression_type(&self, expr: &Expression) -> VarType {
        match expr {
            Expression::IntegerLiteral(_) => VarType::INTEGER,
            Expression::FloatLiteral(_) => VarType::FLOAT,
            Expression::StringLiteral(_) => VarType::STRING,
            Expression::VariableAccess(name) => self
                .symbol_table
                .lookup(name, &self.current_function)
                .map(|s| s.ty)
                .unwrap_or(VarType::INTEGER),
            Expression::BinaryOp { op, lhs, rhs } => self.infer_binary_op_type(*op, lhs, rhs),
            Expression::VectorAccess { vector, .. } => {
                let vector_ty = self.infer_expression_type(vector);
                if vector_ty.is_pair_like() {
                    VarType::PAIR
                } else if vector_ty.contains(VarType::FLOAT) {
                    VarType::FLOAT
                } else {
                    VarType::INTEGER
                }
            }
            Expression::PackedAccess { value, component } => {
                let packed_ty = self.infer_expression_type(value);
                component.component_type(packed_ty)
            }
            Expression::Allocation { kind, .. } => match kind {
                AllocationKind::New => VarType::POINTER_TO | VarType::OBJECT,
                AllocationKind::ListLiteral => VarType::POINTER_TO | VarType::LIST,
                AllocationKind::VectorAllocation => VarType::POINTER_TO | VarType::VEC | VarType::INTEGER,
                AllocationKind::StringAllocation => VarType::STRING,
            },
            Expression::FunctionCall { name, .. } => self.infer_function_call_type(name),
        }
    }

    fn infer_binary_op_type(&self, op: BinaryOperator, lhs: &Expression, rhs: &Expression) -> VarType {
        if matches!(
            op,
            BinaryOperator::Less
                | BinaryOperator::LessEq
                | BinaryOperator::Greater
                | BinaryOperator::GreaterEq
                | BinaryOperator::Eq
                | BinaryOperator::NotEq
        ) {
            return VarType::INTEGER;
        }
        let left = self.infer_expression_type(lhs);
        let right = self.infer_expression_type(rhs);
        if left.contains(VarType::FLOAT) || right.contains(VarType::FLOAT) {
            VarType::FLOAT
        } else {
            VarType::INTEGER
        }
    }

    fn infer_function_call_type(&self, name: &str) -> VarType {
        if let Some(symbol) = self.symbol_table.lookup(name, &self.current_function) {
            if matches!(
                symbol.kind,
                SymbolKind::RuntimeFunction | SymbolKind::RuntimeFloatFunction | SymbolKind::Function | SymbolKind::FloatFunction
            ) {
                return symbol.ty;
            }
        }
        match name {
            "READN" | "LENGTH" | "STRCMP" => VarType::INTEGER,
            "READF" | "SIN" | "COS" | "SQRT" => VarType::FLOAT,
            "READS" | "NEWVEC" => VarType::POINTER_TO | VarType::INTEGER,
            "GETVEC" => VarType::POINTER_TO | VarType::VEC | VarType::INTEGER,
            "FGETVEC" => VarType::POINTER_TO | VarType::VEC | VarType::FLOAT,
            "SPLIT" => VarType::POINTER_TO | VarType::LIST | VarType::STRING,
            _ => VarType::INTEGER,
        }
    }

    /// Recursively and statically evaluates a constant expression, if
    /// possible (ported from `StatelessTypeInference::is_constant_expression`).
    pub fn constant_value(expr: &Expression) -> Option<i64> {
        match expr {
            Expression::IntegerLiteral(v) => Some(*v),
            Expression::BinaryOp { op, lhs, rhs } => {
                let l = Self::constant_value(lhs)?;
                let r = Self::constant_value(rhs)?;
                match op {
                    BinaryOperator::Add => Some(l + r),
                    BinaryOperator::Sub => Some(l - r),
                    BinaryOperator::Mul => Some(l * r),
                    BinaryOperator::Div if r != 0 => Some(l / r),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Analyzes one function's declaration and body, populating the symbol
    /// table and this function's metrics entry.
    pub fn analyze_function(&mut self, func: &FunctionDecl) {
        self.current_function = func.name.clone();
        self.current_class = func.class_name.clone();
        self.function_metrics
            .entry(func.name.clone())
            .or_insert_with(FunctionMetrics::new);

        for param in &func.parameters {
            self.symbol_table.add_symbol(Symbol {
                function_name: func.name.clone(),
                ..Symbol::new(param.clone(), SymbolKind::Parameter, VarType::INTEGER, 0)
            });
            if let Some(metrics) = self.function_metrics.get_mut(&func.name) {
                metrics.num_parameters += 1;
            }
        }

        for stmt in &func.body {
            self.visit_statement(stmt);
        }
    }

    /// Class member tables live outside this crate's AST contract (spec
    /// §1) — a concrete compiler supplies its own class table and wires
    /// the member check in here. Always `false` until that hook exists.
    fn is_class_member(&self, _name: &str) -> bool {
        false
    }

    fn visit_statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Assignment { lhs, rhs } => self.visit_assignment(lhs, rhs),
            Statement::ExpressionStatement(expr) => self.visit_expression(expr),
            Statement::If { condition, then_body, else_body } => {
                self.visit_expression(condition);
                for s in then_body {
                    self.visit_statement(s);
                }
                for s in else_body {
                    self.visit_statement(s);
                }
            }
            Statement::For { body, .. } | Statement::ForEach { body, .. } => {
                for s in body {
                    self.visit_statement(s);
                }
            }
            Statement::Reduction { result_var, collection, .. } => {
                self.visit_expression(collection);
                self.declare_if_new(result_var, VarType::INTEGER);
            }
            Statement::Block(stmts) => {
                for s in stmts {
                    self.visit_statement(s);
                }
            }
            Statement::Return(Some(expr)) | Statement::Resultis(expr) => self.visit_expression(expr),
            Statement::Return(None)
            | Statement::Goto(_)
            | Statement::Label(_)
            | Statement::Break
            | Statement::Loop
            | Statement::EndCase
            | Statement::Finish
            | Statement::ReleaseHeap(_) => {}
            Statement::ReductionDirect { collection, .. } => self.visit_expression(collection),
        }
    }

    fn visit_expression(&mut self, expr: &Expression) {
        match expr {
            Expression::BinaryOp { lhs, rhs, .. } => {
                self.visit_expression(lhs);
                self.visit_expression(rhs);
            }
            Expression::VectorAccess { vector, index } => {
                self.visit_expression(vector);
                self.visit_expression(index);
            }
            Expression::PackedAccess { value, .. } => self.visit_expression(value),
            Expression::FunctionCall { name, args, is_runtime } => {
                for arg in args {
                    self.visit_expression(arg);
                }
                self.record_call(name, *is_runtime);
            }
            Expression::IntegerLiteral(_)
            | Expression::FloatLiteral(_)
            | Expression::StringLiteral(_)
            | Expression::VariableAccess(_)
            | Expression::Allocation { .. } => {}
        }
    }

    fn record_call(&mut self, name: &str, is_runtime: bool) {
        let Some(metrics) = self.function_metrics.get_mut(&self.current_function) else {
            return;
        };
        metrics.record_call();
        if is_runtime {
            metrics.num_runtime_calls += 1;
        } else if self.symbol_table.lookup(name, &self.current_function).is_some_and(|s| s.kind == SymbolKind::Routine) {
            metrics.num_local_routine_calls += 1;
        } else {
            metrics.num_local_function_calls += 1;
        }
    }

    fn declare_if_new(&mut self, name: &str, ty: VarType) {
        if self.symbol_table.lookup(name, &self.current_function).is_none() {
            self.symbol_table.add_symbol(Symbol {
                function_name: self.current_function.clone(),
                scope_level: self.symbol_table.current_scope_level(),
                ..Symbol::new(name, SymbolKind::LocalVar, ty, self.symbol_table.current_scope_level())
            });
            if self.current_function != "Global" {
                if let Some(metrics) = self.function_metrics.get_mut(&self.current_function) {
                    metrics.record_variable_type(name, ty);
                    if ty.contains(VarType::FLOAT) {
                        metrics.num_float_variables += 1;
                    } else {
                        metrics.num_int_variables += 1;
                    }
                }
            }
        }
    }

    /// Spec §4.3: "Destructuring validation" and the ordinary per-variable
    /// assignment path, including ownership flagging and the const-list
    /// write guard.
    fn visit_assignment(&mut self, lhs: &[Expression], rhs: &[Expression]) {
        for expr in rhs {
            self.visit_expression(expr);
        }

        if (lhs.len() == 2 || lhs.len() == 4) && rhs.len() == 1 {
            let rhs_ty = self.infer_expression_type(&rhs[0]);
            let (expected_name, valid, component_ty, arity) = if lhs.len() == 2 {
                ("PAIR/FPAIR", rhs_ty.contains(VarType::PAIR) || rhs_ty.contains(VarType::FPAIR), if rhs_ty.contains(VarType::FPAIR) { VarType::FLOAT } else { VarType::INTEGER }, 2)
            } else {
                ("QUAD", rhs_ty.contains(VarType::QUAD) || rhs_ty.contains(VarType::FQUAD), if rhs_ty.contains(VarType::FQUAD) { VarType::FLOAT } else { VarType::INTEGER }, 4)
            };
            if !valid {
                self.diagnostics.push(AnalyzerDiagnostic::InvalidDestructuring {
                    expected: expected_name,
                    lhs_count: lhs.len(),
                });
                return;
            }
            for lhs_expr in lhs.iter().take(arity) {
                if let Expression::VariableAccess(name) = lhs_expr {
                    if self.is_class_member(name) {
                        continue;
                    }
                    self.update_component_symbol(name, component_ty);
                }
            }
            return;
        }

        let count = lhs.len().min(rhs.len());
        for (lhs_expr, rhs_expr) in lhs.iter().zip(rhs.iter()).take(count) {
            let Expression::VariableAccess(name) = lhs_expr else {
                self.guard_const_list_write(lhs_expr);
                continue;
            };
            if self.is_class_member(name) {
                continue;
            }
            self.check_memory_leak(name, rhs_expr);

            let rhs_ty = self.infer_expression_type(rhs_expr);
            let variable_ty = match self.symbol_table.lookup(name, &self.current_function) {
                Some(existing) if VarType::should_update(existing.ty, rhs_ty) => rhs_ty,
                Some(existing) => existing.ty,
                None => rhs_ty,
            };

            if self.current_function != "Global" {
                if let Some(metrics) = self.function_metrics.get_mut(&self.current_function) {
                    metrics.record_variable_type(name, variable_ty);
                }
            }

            let allocation_kind = allocation_kind_of(rhs_expr);
            let owns_heap_memory = allocation_kind.is_some();
            let contains_literals = matches!(
                rhs_expr,
                Expression::Allocation { kind: AllocationKind::ListLiteral, .. }
            );

            match self.symbol_table.lookup(name, &self.current_function).cloned() {
                Some(mut symbol) => {
                    symbol.ty = variable_ty;
                    symbol.owns_heap_memory = owns_heap_memory;
                    symbol.contains_literals = contains_literals;
                    self.symbol_table.update_symbol(name, symbol);
                }
                None => {
                    let mut symbol = Symbol::new(name.clone(), SymbolKind::LocalVar, variable_ty, self.symbol_table.current_scope_level());
                    symbol.function_name = self.current_function.clone();
                    symbol.owns_heap_memory = owns_heap_memory;
                    symbol.contains_literals = contains_literals;
                    self.symbol_table.add_symbol(symbol);
                    if self.current_function != "Global" {
                        if let Some(metrics) = self.function_metrics.get_mut(&self.current_function) {
                            metrics.num_variables_incr(variable_ty);
                        }
                    }
                }
            }
        }

        for lhs_expr in &lhs[count..] {
            self.guard_const_list_write(lhs_expr);
        }
    }

    fn update_component_symbol(&mut self, name: &str, component_ty: VarType) {
        if let Some(mut symbol) = self.symbol_table.lookup(name, &self.current_function).cloned() {
            symbol.ty = component_ty;
            symbol.owns_heap_memory = false;
            symbol.contains_literals = false;
            self.symbol_table.update_symbol(name, symbol);
        } else {
            let mut symbol = Symbol::new(name.to_string(), SymbolKind::LocalVar, component_ty, self.symbol_table.current_scope_level());
            symbol.function_name = self.current_function.clone();
            self.symbol_table.add_symbol(symbol);
        }
        if self.current_function != "Global" {
            if let Some(metrics) = self.function_metrics.get_mut(&self.current_function) {
                metrics.record_variable_type(name, component_ty);
            }
        }
    }

    fn check_memory_leak(&mut self, name: &str, rhs: &Expression) {
        let Some(existing) = self.symbol_table.lookup(name, &self.current_function) else {
            return;
        };
        if existing.owns_heap_memory && allocation_kind_of(rhs).is_some() {
            self.diagnostics.push(AnalyzerDiagnostic::PotentialMemoryLeak { variable: name.to_string() });
        }
    }

    /// Spec §4.3: writes through `HD`/`TL` of a `MANIFESTLIST` (a
    /// `POINTER_TO|LIST|CONST` value) are rejected.
    fn guard_const_list_write(&mut self, lhs_expr: &Expression) {
        if let Expression::VectorAccess { vector, .. } = lhs_expr {
            let list_ty = self.infer_expression_type(vector);
            if list_ty.is_const_list() {
                if let Expression::VariableAccess(name) = vector.as_ref() {
                    self.diagnostics.push(AnalyzerDiagnostic::AssignmentToConstList { variable: name.clone() });
                }
            }
        }
    }
}

fn allocation_kind_of(expr: &Expression) -> Option<AllocationKind> {
    match expr {
        Expression::Allocation { kind, .. } => Some(*kind),
        _ => None,
    }
}

/// Creates, registers, and attributes a fresh temporary variable (ported
/// from `TemporaryVariableFactory::create`). Kept as a method on `Analyzer`
/// rather than a free-standing counter struct so the temp's symbol-table
/// registration and metrics update cannot drift out of sync with the scope
/// the caller is currently analyzing.
impl Analyzer {
    pub fn create_temporary(&mut self, function_name: &str, ty: VarType) -> String {
        let temp_name = format!("_opt_temp_{}", self.temp_var_counter);
        self.temp_var_counter += 1;

        let mut symbol = Symbol::new(temp_name.clone(), SymbolKind::LocalVar, ty, self.symbol_table.current_scope_level());
        symbol.function_name = function_name.to_string();
        self.symbol_table.add_symbol(symbol);

        if let Some(metrics) = self.function_metrics.get_mut(function_name) {
            metrics.num_variables_incr(ty);
            metrics.variable_types.insert(temp_name.clone(), ty);
        }

        temp_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::PackedComponent as PC;

    fn decl(name: &str, body: Vec<Statement>) -> FunctionDecl {
        FunctionDecl {
            name: name.to_string(),
            body,
            ..Default::default()
        }
    }

    #[test]
    fn simple_assignment_declares_and_types_variable() {
        let mut a = Analyzer::new();
        a.analyze_function(&decl(
            "F",
            vec![Statement::Assignment {
                lhs: vec![Expression::VariableAccess("x".into())],
                rhs: vec![Expression::IntegerLiteral(5)],
            }],
        ));
        let sym = a.symbol_table.lookup("x", "F").unwrap();
        assert_eq!(sym.ty, VarType::INTEGER);
        assert_eq!(a.function_metrics["F"].num_int_variables, 1);
    }

    #[test]
    fn allocation_rhs_sets_ownership_flag() {
        let mut a = Analyzer::new();
        a.analyze_function(&decl(
            "F",
            vec![Statement::Assignment {
                lhs: vec![Expression::VariableAccess("p".into())],
                rhs: vec![Expression::Allocation { kind: AllocationKind::New, literal_size: None, initializer_len: None }],
            }],
        ));
        assert!(a.symbol_table.lookup("p", "F").unwrap().owns_heap_memory);
    }

    #[test]
    fn reassigning_heap_owner_with_new_allocation_warns() {
        let mut a = Analyzer::new();
        a.analyze_function(&decl(
            "F",
            vec![
                Statement::Assignment {
                    lhs: vec![Expression::VariableAccess("p".into())],
                    rhs: vec![Expression::Allocation { kind: AllocationKind::New, literal_size: None, initializer_len: None }],
                },
                Statement::Assignment {
                    lhs: vec![Expression::VariableAccess("p".into())],
                    rhs: vec![Expression::Allocation { kind: AllocationKind::New, literal_size: None, initializer_len: None }],
                },
            ],
        ));
        assert!(a
            .diagnostics
            .iter()
            .any(|d| matches!(d, AnalyzerDiagnostic::PotentialMemoryLeak { variable } if variable == "p")));
    }

    #[test]
    fn pair_destructuring_assigns_integer_components() {
        let mut a = Analyzer::new();
        a.analyze_function(&decl(
            "F",
            vec![Statement::Assignment {
                lhs: vec![Expression::VariableAccess("a".into()), Expression::VariableAccess("b".into())],
                rhs: vec![Expression::VariableAccess("pr".into())],
            }],
        ));
        // "pr" defaults to INTEGER (unknown symbol), so this destructuring is invalid.
        assert!(a
            .diagnostics
            .iter()
            .any(|d| matches!(d, AnalyzerDiagnostic::InvalidDestructuring { lhs_count: 2, .. })));
    }

    #[test]
    fn valid_pair_destructuring_produces_no_diagnostic() {
        let mut a = Analyzer::new();
        let mut pr = Symbol::new("pr", SymbolKind::LocalVar, VarType::PAIR, 0);
        pr.function_name = "F".to_string();
        a.symbol_table.add_symbol(pr);
        a.analyze_function(&decl(
            "F",
            vec![Statement::Assignment {
                lhs: vec![Expression::VariableAccess("a".into()), Expression::VariableAccess("b".into())],
                rhs: vec![Expression::VariableAccess("pr".into())],
            }],
        ));
        assert!(a.diagnostics.is_empty());
        assert_eq!(a.symbol_table.lookup("a", "F").unwrap().ty, VarType::INTEGER);
    }

    #[test]
    fn packed_access_on_fpair_yields_float() {
        let a = Analyzer::new();
        let expr = Expression::PackedAccess {
            value: Box::new(Expression::VariableAccess("fp".into())),
            component: PC::First,
        };
        // "fp" is unknown, defaults to INTEGER symbol lookup -> component_type sees non-FPAIR -> INTEGER.
        assert_eq!(a.infer_expression_type(&expr), VarType::INTEGER);
    }

    #[test]
    fn temporary_creation_is_unique_and_registered() {
        let mut a = Analyzer::new();
        a.function_metrics.insert("F".to_string(), FunctionMetrics::new());
        let t1 = a.create_temporary("F", VarType::INTEGER);
        let t2 = a.create_temporary("F", VarType::FLOAT);
        assert_ne!(t1, t2);
        assert_eq!(a.symbol_table.lookup(&t1, "F").unwrap().ty, VarType::INTEGER);
        assert_eq!(a.function_metrics["F"].num_float_variables, 1);
    }

    #[test]
    fn runtime_call_increments_runtime_metric() {
        let mut a = Analyzer::new();
        a.analyze_function(&decl(
            "F",
            vec![Statement::ExpressionStatement(Expression::FunctionCall {
                name: "WRITEF".into(),
                args: vec![],
                is_runtime: true,
            })],
        ));
        assert_eq!(a.function_metrics["F"].num_runtime_calls, 1);
        assert!(!a.function_metrics["F"].is_leaf);
    }
}
