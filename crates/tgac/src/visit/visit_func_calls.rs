use super::VisitMut;
use hcl::{
    template::{Directive, Element},
    Expression, Operation, Template, TemplateExpr,
};

/// Recursively visit all [hcl::expr::FuncCall] expressions mutably
///
/// The visitor receives the whole [Expression] so it can replace the call with something else.
/// Arguments are visited before the call itself, which allows nested calls to be substituted
/// inside-out: `find_in_parent_folders(get_env("NAME"))`.
pub trait VisitFuncCallsMut {
    fn visit_func_calls_mut(&mut self, visitor: &mut dyn VisitMut<Expression>);
}

impl VisitFuncCallsMut for Expression {
    fn visit_func_calls_mut(&mut self, visitor: &mut dyn VisitMut<Expression>) {
        match self {
            Expression::FuncCall(func_call) => {
                for arg in func_call.args.iter_mut() {
                    arg.visit_func_calls_mut(visitor);
                }
                visitor.visit_mut(self);
            }
            Expression::Traversal(traversal) => {
                traversal.expr.visit_func_calls_mut(visitor);
            }
            Expression::Array(array) => {
                for expr in array {
                    expr.visit_func_calls_mut(visitor);
                }
            }
            Expression::Object(object) => {
                for value in object.values_mut() {
                    value.visit_func_calls_mut(visitor);
                }
            }
            Expression::TemplateExpr(template_expr) => {
                let Ok(mut template) = Template::from_expr(template_expr) else {
                    tracing::debug!(?template_expr, "template could not be parsed, left as is");
                    return;
                };
                template.visit_func_calls_mut(visitor);
                *template_expr = Box::new(TemplateExpr::QuotedString(template.to_string()));
            }
            Expression::Parenthesis(expr) => {
                expr.visit_func_calls_mut(visitor);
            }
            Expression::Conditional(cond) => {
                cond.cond_expr.visit_func_calls_mut(visitor);
                cond.true_expr.visit_func_calls_mut(visitor);
                cond.false_expr.visit_func_calls_mut(visitor);
            }
            Expression::Operation(operation) => match operation.as_mut() {
                Operation::Binary(binop) => {
                    binop.lhs_expr.visit_func_calls_mut(visitor);
                    binop.rhs_expr.visit_func_calls_mut(visitor);
                }
                Operation::Unary(unop) => {
                    unop.expr.visit_func_calls_mut(visitor);
                }
            },
            Expression::ForExpr(forexpr) => {
                forexpr
                    .cond_expr
                    .iter_mut()
                    .for_each(|e| e.visit_func_calls_mut(visitor));
                forexpr
                    .key_expr
                    .iter_mut()
                    .for_each(|e| e.visit_func_calls_mut(visitor));
                forexpr.value_expr.visit_func_calls_mut(visitor);
                forexpr.collection_expr.visit_func_calls_mut(visitor);
            }
            _ => {}
        }
    }
}

impl VisitFuncCallsMut for Template {
    fn visit_func_calls_mut(&mut self, visitor: &mut dyn VisitMut<Expression>) {
        for element in self.elements_mut() {
            match element {
                Element::Interpolation(interpolation) => {
                    interpolation.expr.visit_func_calls_mut(visitor);
                }
                Element::Directive(directive) => match directive {
                    Directive::If(ifdir) => {
                        ifdir.cond_expr.visit_func_calls_mut(visitor);
                        ifdir.true_template.visit_func_calls_mut(visitor);
                        ifdir
                            .false_template
                            .iter_mut()
                            .for_each(|t| t.visit_func_calls_mut(visitor));
                    }
                    Directive::For(fordir) => {
                        fordir.template.visit_func_calls_mut(visitor);
                        fordir.collection_expr.visit_func_calls_mut(visitor);
                    }
                },
                Element::Literal(_) => {}
            }
        }
    }
}
