//! Grammar-driven parsing into the typed AST.
//!
//! Struct declarations register their layout in a [`TypeTable`] as they are
//! encountered, so later declarations can refer to them by name. The
//! builtin pseudo-calls (`cast_u24`, `cast_s24`, `get_addr`, `get_content`)
//! are recognized here and turned into their dedicated AST forms.

use crate::ast::{self, AssignOp, BinOp, Expr, Pos, Stmt};
use crate::error::{type_error, Result};
use crate::types::{addr_of, Type, TypeTable};
use matches::debug_assert_matches;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "grammar.pest"]
pub struct SkaldParser;

fn pos_of(pair: &Pair<Rule>) -> Pos {
    let (line, col) = pair.as_span().start_pos().line_col();
    Pos { line, col }
}

fn parse_int(text: &str) -> Option<i64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2).ok()
    } else if let Some(oct) = text.strip_prefix("0o").or_else(|| text.strip_prefix("0O")) {
        i64::from_str_radix(oct, 8).ok()
    } else {
        text.parse().ok()
    }
}

pub fn parse(source: &str) -> Result<ast::Program> {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    let mut pairs = SkaldParser::parse(Rule::program, source)?;
    let program = pairs.next().unwrap();
    debug_assert_matches!(program.as_rule(), Rule::program);

    let mut types = TypeTable::new();
    let mut decls = Vec::new();
    for pair in program.into_inner() {
        match pair.as_rule() {
            Rule::struct_decl => decls.push(ast::Decl::Struct(parse_struct(pair, &mut types)?)),
            Rule::global_let => decls.push(ast::Decl::Var(parse_let(pair, &types, true)?)),
            Rule::fn_decl => decls.push(ast::Decl::Func(parse_fn(pair, &types)?)),
            Rule::EOI => {}
            _ => unreachable!(),
        }
    }
    Ok(ast::Program { decls })
}

fn parse_struct(pair: Pair<Rule>, types: &mut TypeTable) -> Result<ast::StructDecl> {
    let pos = pos_of(&pair);
    let mut name = String::new();
    let mut fields: Vec<(String, Type)> = Vec::new();
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::kw_struct => {}
            Rule::ident => name = part.as_str().to_string(),
            Rule::struct_field => {
                let mut inner = part.into_inner();
                let field_name = inner.next().unwrap().as_str().to_string();
                let field_ty = parse_ty(inner.next().unwrap(), types)?;
                fields.push((field_name, field_ty));
            }
            _ => unreachable!(),
        }
    }
    types.define_struct(&name, fields, pos)?;
    Ok(ast::StructDecl { name, pos })
}

fn parse_ty(pair: Pair<Rule>, types: &TypeTable) -> Result<Type> {
    debug_assert_matches!(pair.as_rule(), Rule::ty);
    let pos = pos_of(&pair);
    let mut inner = pair.into_inner();
    let base_pair = inner.next().unwrap();
    let base_inner = base_pair.into_inner().next().unwrap();
    let base = match base_inner.as_rule() {
        Rule::kw_u24 => Type::U24,
        Rule::kw_s24 => Type::S24,
        Rule::addr_ty => {
            let pointee = base_inner
                .into_inner()
                .find(|p| p.as_rule() == Rule::ty)
                .unwrap();
            addr_of(parse_ty(pointee, types)?)
        }
        Rule::ident => {
            let name = base_inner.as_str();
            types
                .lookup(name)
                .ok_or_else(|| type_error(pos, format!("unknown type '{}'", name)))?
        }
        _ => unreachable!(),
    };
    if let Some(suffix) = inner.next() {
        debug_assert_matches!(suffix.as_rule(), Rule::array_suffix);
        let length_pair = suffix.into_inner().next().unwrap();
        let length = parse_int(length_pair.as_str())
            .filter(|len| *len > 0)
            .ok_or_else(|| type_error(pos, "invalid array length"))?;
        return types.array_of(base, length as u32, pos);
    }
    Ok(base)
}

fn parse_let(pair: Pair<Rule>, types: &TypeTable, is_global: bool) -> Result<ast::VarDecl> {
    let pos = pos_of(&pair);
    let mut name = String::new();
    let mut ty: Option<Type> = None;
    let mut init: Option<Expr> = None;
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::kw_let => {}
            Rule::ident => name = part.as_str().to_string(),
            Rule::ty => ty = Some(parse_ty(part, types)?),
            _ => init = Some(parse_expr(part)?),
        }
    }
    Ok(ast::VarDecl {
        name,
        ty: ty.unwrap(),
        init,
        is_global,
        pos,
    })
}

fn parse_fn(pair: Pair<Rule>, types: &TypeTable) -> Result<ast::FuncDecl> {
    let pos = pos_of(&pair);
    let mut name = String::new();
    let mut params: Vec<ast::Param> = Vec::new();
    let mut ret_ty: Option<Type> = None;
    let mut ret_reg_hint: Option<String> = None;
    let mut body: Vec<Stmt> = Vec::new();
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::kw_fn => {}
            Rule::ident => name = part.as_str().to_string(),
            Rule::param => params.push(parse_param(part, types)?),
            Rule::ret_clause => {
                for clause in part.into_inner() {
                    match clause.as_rule() {
                        Rule::ty => ret_ty = Some(parse_ty(clause, types)?),
                        Rule::kw_out => {}
                        Rule::ident => ret_reg_hint = Some(clause.as_str().to_uppercase()),
                        _ => unreachable!(),
                    }
                }
            }
            Rule::block => body = parse_block(part, types)?,
            _ => unreachable!(),
        }
    }
    Ok(ast::FuncDecl {
        name,
        params,
        ret_ty,
        ret_reg_hint,
        body,
        pos,
    })
}

fn parse_param(pair: Pair<Rule>, types: &TypeTable) -> Result<ast::Param> {
    let pos = pos_of(&pair);
    let mut inner = pair.into_inner();
    let name = inner.next().unwrap().as_str().to_string();
    let ty = parse_ty(inner.next().unwrap(), types)?;
    let mut reg_hint = None;
    for part in inner {
        match part.as_rule() {
            Rule::kw_in => {}
            Rule::ident => reg_hint = Some(part.as_str().to_uppercase()),
            _ => unreachable!(),
        }
    }
    Ok(ast::Param {
        name,
        ty,
        reg_hint,
        pos,
    })
}

fn parse_block(pair: Pair<Rule>, types: &TypeTable) -> Result<Vec<Stmt>> {
    debug_assert_matches!(pair.as_rule(), Rule::block);
    pair.into_inner()
        .map(|stmt| parse_stmt(stmt, types))
        .collect()
}

fn parse_stmt(pair: Pair<Rule>, types: &TypeTable) -> Result<Stmt> {
    let pos = pos_of(&pair);
    match pair.as_rule() {
        Rule::let_stmt => Ok(Stmt::Let(parse_let(pair, types, false)?)),
        Rule::if_stmt => {
            let mut cond = None;
            let mut blocks: Vec<Vec<Stmt>> = Vec::new();
            for part in pair.into_inner() {
                match part.as_rule() {
                    Rule::kw_if | Rule::kw_else => {}
                    Rule::block => blocks.push(parse_block(part, types)?),
                    _ => cond = Some(parse_expr(part)?),
                }
            }
            let mut blocks = blocks.into_iter();
            Ok(Stmt::If {
                cond: cond.unwrap(),
                then_body: blocks.next().unwrap(),
                else_body: blocks.next(),
                pos,
            })
        }
        Rule::while_stmt => {
            let mut cond = None;
            let mut body = Vec::new();
            for part in pair.into_inner() {
                match part.as_rule() {
                    Rule::kw_while => {}
                    Rule::block => body = parse_block(part, types)?,
                    _ => cond = Some(parse_expr(part)?),
                }
            }
            Ok(Stmt::While {
                cond: cond.unwrap(),
                body,
                pos,
            })
        }
        Rule::break_stmt => Ok(Stmt::Break(pos)),
        Rule::continue_stmt => Ok(Stmt::Continue(pos)),
        Rule::return_stmt => {
            let mut value = None;
            for part in pair.into_inner() {
                if part.as_rule() != Rule::kw_return {
                    value = Some(parse_expr(part)?);
                }
            }
            Ok(Stmt::Return { value, pos })
        }
        Rule::call_stmt => {
            let call = pair.into_inner().next().unwrap();
            Ok(Stmt::Expr(parse_expr(call)?))
        }
        Rule::assign_stmt => {
            let mut inner = pair.into_inner();
            let target = parse_chain(inner.next().unwrap())?;
            let op = match inner.next().unwrap().as_str() {
                "=" => AssignOp::Set,
                "+=" => AssignOp::Add,
                "-=" => AssignOp::Sub,
                "&=" => AssignOp::And,
                "|=" => AssignOp::Or,
                "^=" => AssignOp::Xor,
                "<<=" => AssignOp::Shl,
                ">>=" => AssignOp::Shr,
                "<<<=" => AssignOp::Rol,
                ">>>=" => AssignOp::Ror,
                _ => unreachable!(),
            };
            let value = parse_expr(inner.next().unwrap())?;
            Ok(Stmt::Assign {
                target,
                op,
                value,
                pos,
            })
        }
        _ => unreachable!(),
    }
}

/// `ident ('.' field | '[' expr ']')*` — shared by lvalues and name chains.
fn parse_chain(pair: Pair<Rule>) -> Result<Expr> {
    debug_assert_matches!(pair.as_rule(), Rule::lvalue | Rule::name_chain);
    let mut inner = pair.into_inner();
    let head = inner.next().unwrap();
    let pos = pos_of(&head);
    let mut expr = Expr::Name {
        ident: head.as_str().to_string(),
        pos,
    };
    for postfix in inner {
        match postfix.as_rule() {
            Rule::field_access => {
                let field = postfix.into_inner().next().unwrap();
                expr = Expr::Field {
                    base: Box::new(expr),
                    field: field.as_str().to_string(),
                    pos,
                };
            }
            Rule::index_access => {
                let index_pair = postfix.into_inner().next().unwrap();
                let index = parse_expr(index_pair)?;
                expr = Expr::Index {
                    base: Box::new(expr),
                    index: Box::new(index),
                    pos,
                };
            }
            _ => unreachable!(),
        }
    }
    Ok(expr)
}

fn parse_expr(pair: Pair<Rule>) -> Result<Expr> {
    match pair.as_rule() {
        Rule::bitor_expr
        | Rule::bitxor_expr
        | Rule::bitand_expr
        | Rule::equality_expr
        | Rule::relational_expr
        | Rule::shift_expr
        | Rule::add_expr
        | Rule::mul_expr => fold_binary(pair),
        Rule::unary_expr => {
            let pos = pos_of(&pair);
            let mut inner = pair.into_inner();
            let first = inner.next().unwrap();
            if first.as_rule() == Rule::unary_op {
                let operand = parse_expr(inner.next().unwrap())?;
                return Ok(match first.as_str() {
                    "~" => Expr::Not {
                        expr: Box::new(operand),
                        pos,
                    },
                    // Unary +x and -x become 0 + x and 0 - x.
                    op => Expr::Binary {
                        op: if op == "-" { BinOp::Sub } else { BinOp::Add },
                        lhs: Box::new(Expr::Int { value: 0, pos }),
                        rhs: Box::new(operand),
                        pos,
                    },
                });
            }
            parse_expr(first)
        }
        Rule::number => {
            let pos = pos_of(&pair);
            let value = parse_int(pair.as_str())
                .ok_or_else(|| type_error(pos, format!("invalid number '{}'", pair.as_str())))?;
            Ok(Expr::Int { value, pos })
        }
        Rule::call => parse_call(pair),
        Rule::name_chain => parse_chain(pair),
        Rule::paren_expr => parse_expr(pair.into_inner().next().unwrap()),
        _ => unreachable!(),
    }
}

fn fold_binary(pair: Pair<Rule>) -> Result<Expr> {
    let mut inner = pair.into_inner();
    let mut lhs = parse_expr(inner.next().unwrap())?;
    while let Some(op_pair) = inner.next() {
        let pos = pos_of(&op_pair);
        let op = match op_pair.as_str() {
            "|" => BinOp::Or,
            "^" => BinOp::Xor,
            "&" => BinOp::And,
            "==" => BinOp::Eq,
            "!=" => BinOp::Ne,
            "<=" => BinOp::Le,
            ">=" => BinOp::Ge,
            "<" => BinOp::Lt,
            ">" => BinOp::Gt,
            "<<" => BinOp::Shl,
            ">>" => BinOp::Shr,
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            "*" => BinOp::Mul,
            "/" => BinOp::Div,
            _ => unreachable!(),
        };
        let rhs = parse_expr(inner.next().unwrap())?;
        lhs = Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            pos,
        };
    }
    Ok(lhs)
}

fn parse_call(pair: Pair<Rule>) -> Result<Expr> {
    debug_assert_matches!(pair.as_rule(), Rule::call);
    let pos = pos_of(&pair);
    let mut inner = pair.into_inner();
    let callee = inner.next().unwrap().as_str().to_string();
    let args: Vec<Expr> = inner
        .map(parse_expr)
        .collect::<Result<_>>()?;

    match callee.as_str() {
        "cast_u24" | "cast_s24" => {
            if args.len() != 1 {
                return Err(type_error(pos, format!("{} expects exactly 1 argument", callee)));
            }
            let target = if callee == "cast_s24" { Type::S24 } else { Type::U24 };
            let expr = args.into_iter().next().unwrap();
            Ok(Expr::Cast {
                target,
                expr: Box::new(expr),
                pos,
            })
        }
        "get_addr" => {
            if args.len() != 1 {
                return Err(type_error(pos, "get_addr expects 1 argument"));
            }
            let target = args.into_iter().next().unwrap();
            if !matches!(target, Expr::Name { .. } | Expr::Field { .. }) {
                return Err(type_error(
                    pos,
                    "get_addr argument must be a variable or field access",
                ));
            }
            Ok(Expr::AddressOf {
                target: Box::new(target),
                pos,
            })
        }
        "get_content" => {
            if args.len() != 1 {
                return Err(type_error(pos, "get_content expects 1 argument"));
            }
            let addr = args.into_iter().next().unwrap();
            Ok(Expr::Deref {
                addr: Box::new(addr),
                pos,
            })
        }
        _ => Ok(Expr::Call { callee, args, pos }),
    }
}
