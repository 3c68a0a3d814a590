//! XML Schema (XSD) body matching.
//!
//! Schemas are compiled into an owned model and documents are validated
//! against it natively. Supported subset:
//!
//! - global `xs:element` declarations, `ref` to global elements
//! - named and anonymous `xs:complexType` with `xs:sequence`, `xs:choice`,
//!   `xs:all`, `minOccurs`/`maxOccurs`, `mixed`, and `xs:attribute`
//! - named and anonymous `xs:simpleType` restrictions with the facets
//!   `enumeration`, `pattern`, `length`, `minLength`, `maxLength`,
//!   `minInclusive`, `maxInclusive`, `minExclusive`, `maxExclusive`
//! - the common built-in types (`string`, `int`, `decimal`, `date`, ...)
//!
//! Anything else in a schema is a compilation error. Content models are
//! matched greedily, which is exact for schemas obeying the Unique Particle
//! Attribution rule.

use super::precheck;
use crate::error::MatcherError;
use crate::predicate::diagnostics::{diff, FieldName, MatchDiagnostics};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::OnceCell;
use regex::Regex;
use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use sxd_document::dom::{ChildOfElement, ChildOfRoot, Element};
use sxd_document::{parser, QName};
use tracing::warn;

const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";
const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

/// Maximum depth of named simple type derivation chains.
const MAX_DERIVATION_DEPTH: usize = 32;

/// Maximum element nesting accepted when validating a document.
const MAX_DOCUMENT_DEPTH: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuiltIn {
    String,
    Int,
    Integer,
    Long,
    Short,
    Decimal,
    Double,
    Float,
    Boolean,
    Date,
    DateTime,
    PositiveInteger,
    NonNegativeInteger,
    AnyUri,
}

impl BuiltIn {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "string" | "anySimpleType" => BuiltIn::String,
            "int" => BuiltIn::Int,
            "integer" => BuiltIn::Integer,
            "long" => BuiltIn::Long,
            "short" => BuiltIn::Short,
            "decimal" => BuiltIn::Decimal,
            "double" => BuiltIn::Double,
            "float" => BuiltIn::Float,
            "boolean" => BuiltIn::Boolean,
            "date" => BuiltIn::Date,
            "dateTime" => BuiltIn::DateTime,
            "positiveInteger" => BuiltIn::PositiveInteger,
            "nonNegativeInteger" => BuiltIn::NonNegativeInteger,
            "anyURI" => BuiltIn::AnyUri,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            BuiltIn::String => "string",
            BuiltIn::Int => "int",
            BuiltIn::Integer => "integer",
            BuiltIn::Long => "long",
            BuiltIn::Short => "short",
            BuiltIn::Decimal => "decimal",
            BuiltIn::Double => "double",
            BuiltIn::Float => "float",
            BuiltIn::Boolean => "boolean",
            BuiltIn::Date => "date",
            BuiltIn::DateTime => "dateTime",
            BuiltIn::PositiveInteger => "positiveInteger",
            BuiltIn::NonNegativeInteger => "nonNegativeInteger",
            BuiltIn::AnyUri => "anyURI",
        }
    }

    fn is_numeric(self) -> bool {
        matches!(
            self,
            BuiltIn::Int
                | BuiltIn::Integer
                | BuiltIn::Long
                | BuiltIn::Short
                | BuiltIn::Decimal
                | BuiltIn::Double
                | BuiltIn::Float
                | BuiltIn::PositiveInteger
                | BuiltIn::NonNegativeInteger
        )
    }

    /// Check the lexical form; `value` has already been whitespace-normalised.
    fn check(self, value: &str) -> bool {
        match self {
            BuiltIn::String | BuiltIn::AnyUri => true,
            BuiltIn::Int => parse_integer(value).is_some_and(|n| i32::try_from(n).is_ok()),
            BuiltIn::Long => parse_integer(value).is_some_and(|n| i64::try_from(n).is_ok()),
            BuiltIn::Short => parse_integer(value).is_some_and(|n| i16::try_from(n).is_ok()),
            BuiltIn::Integer => parse_integer(value).is_some(),
            BuiltIn::PositiveInteger => parse_integer(value).is_some_and(|n| n > 0),
            BuiltIn::NonNegativeInteger => parse_integer(value).is_some_and(|n| n >= 0),
            BuiltIn::Decimal => is_decimal(value),
            BuiltIn::Double | BuiltIn::Float => parse_float(value).is_some(),
            BuiltIn::Boolean => matches!(value, "true" | "false" | "1" | "0"),
            BuiltIn::Date => NaiveDate::parse_from_str(strip_timezone(value), "%Y-%m-%d").is_ok(),
            BuiltIn::DateTime => {
                DateTime::parse_from_rfc3339(value).is_ok()
                    || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
            }
        }
    }
}

fn parse_integer(value: &str) -> Option<i128> {
    let digits = value.strip_prefix('+').unwrap_or(value);
    if digits.is_empty() || digits == "-" {
        return None;
    }
    digits.parse().ok()
}

fn is_decimal(value: &str) -> bool {
    let unsigned = value.strip_prefix(['+', '-']).unwrap_or(value);
    let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    (!whole.is_empty() || !fraction.is_empty())
        && whole.bytes().all(|b| b.is_ascii_digit())
        && fraction.bytes().all(|b| b.is_ascii_digit())
}

fn parse_float(value: &str) -> Option<f64> {
    match value {
        "INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        // Rust also accepts "inf"/"nan" spellings, XSD does not
        other if other.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => None,
        other => other.parse().ok(),
    }
}

fn strip_timezone(value: &str) -> &str {
    if let Some(date) = value.strip_suffix('Z') {
        return date;
    }
    // YYYY-MM-DD+hh:mm
    if value.len() == 16 && matches!(value.as_bytes()[10], b'+' | b'-') {
        return &value[..10];
    }
    value
}

/// Facets of one restriction step; derived types add further steps.
#[derive(Debug, Default)]
struct Facets {
    enumeration: Vec<String>,
    patterns: Vec<Regex>,
    length: Option<usize>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    min_inclusive: Option<f64>,
    max_inclusive: Option<f64>,
    min_exclusive: Option<f64>,
    max_exclusive: Option<f64>,
}

impl Facets {
    fn check(&self, value: &str) -> Result<(), String> {
        if !self.enumeration.is_empty() && !self.enumeration.iter().any(|e| e == value) {
            return Err(format!(
                "value '{}' is not one of [{}]",
                value,
                self.enumeration.join(", ")
            ));
        }
        if !self.patterns.is_empty() && !self.patterns.iter().any(|p| p.is_match(value)) {
            return Err(format!("value '{value}' does not match the required pattern"));
        }

        let length = value.chars().count();
        if self.length.is_some_and(|l| length != l) {
            return Err(format!("value '{value}' must have length {}", self.length.unwrap_or(0)));
        }
        if let Some(min) = self.min_length.filter(|min| length < *min) {
            return Err(format!("value '{value}' is shorter than {min}"));
        }
        if let Some(max) = self.max_length.filter(|max| length > *max) {
            return Err(format!("value '{value}' is longer than {max}"));
        }

        let bounded = self.min_inclusive.is_some()
            || self.max_inclusive.is_some()
            || self.min_exclusive.is_some()
            || self.max_exclusive.is_some();
        if bounded {
            let number = parse_float(value).ok_or_else(|| format!("value '{value}' is not numeric"))?;
            if self.min_inclusive.is_some_and(|min| number < min)
                || self.max_inclusive.is_some_and(|max| number > max)
                || self.min_exclusive.is_some_and(|min| number <= min)
                || self.max_exclusive.is_some_and(|max| number >= max)
            {
                return Err(format!("value '{value}' is out of range"));
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
struct SimpleType {
    base: BuiltIn,
    restrictions: Vec<Facets>,
}

impl SimpleType {
    fn built_in(base: BuiltIn) -> Self {
        Self {
            base,
            restrictions: Vec::new(),
        }
    }

    fn check(&self, raw: &str) -> Result<(), String> {
        let value = if self.base == BuiltIn::String {
            raw
        } else {
            raw.trim()
        };
        if !self.base.check(value) {
            return Err(format!("value '{}' is not a valid {}", value, self.base.name()));
        }
        for facets in &self.restrictions {
            facets.check(value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Occurs {
    min: u32,
    /// `None` is unbounded
    max: Option<u32>,
}

#[derive(Debug)]
enum ElementType {
    Any,
    Simple(SimpleType),
    Complex(Box<ComplexType>),
    /// Named global complex type
    Named(String),
}

#[derive(Debug)]
struct ElementDecl {
    name: String,
    ty: ElementType,
}

#[derive(Debug)]
enum Particle {
    Element { decl: ElementDecl, occurs: Occurs },
    Ref { name: String, occurs: Occurs },
    Sequence { items: Vec<Particle>, occurs: Occurs },
    Choice { items: Vec<Particle>, occurs: Occurs },
    All { items: Vec<Particle>, occurs: Occurs },
}

impl Particle {
    fn occurs(&self) -> Occurs {
        match self {
            Particle::Element { occurs, .. }
            | Particle::Ref { occurs, .. }
            | Particle::Sequence { occurs, .. }
            | Particle::Choice { occurs, .. }
            | Particle::All { occurs, .. } => *occurs,
        }
    }

    fn emptiable(&self) -> bool {
        if self.occurs().min == 0 {
            return true;
        }
        match self {
            Particle::Element { .. } | Particle::Ref { .. } => false,
            Particle::Sequence { items, .. } | Particle::All { items, .. } => {
                items.iter().all(Particle::emptiable)
            }
            Particle::Choice { items, .. } => items.iter().any(Particle::emptiable),
        }
    }

    /// Whether an element named `name` can be the first one this particle consumes.
    fn can_start_with(&self, name: &str) -> bool {
        match self {
            Particle::Element { decl, .. } => decl.name == name,
            Particle::Ref { name: target, .. } => target == name,
            Particle::Sequence { items, .. } => {
                for item in items {
                    if item.can_start_with(name) {
                        return true;
                    }
                    if !item.emptiable() {
                        return false;
                    }
                }
                false
            }
            Particle::Choice { items, .. } | Particle::All { items, .. } => {
                items.iter().any(|item| item.can_start_with(name))
            }
        }
    }

    fn element_name(&self) -> Option<&str> {
        match self {
            Particle::Element { decl, .. } => Some(&decl.name),
            Particle::Ref { name, .. } => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct AttributeDecl {
    name: String,
    ty: SimpleType,
    required: bool,
}

#[derive(Debug)]
struct ComplexType {
    content: Option<Particle>,
    attributes: Vec<AttributeDecl>,
    mixed: bool,
}

/// A compiled XML schema.
#[derive(Debug)]
pub struct XmlSchema {
    target_namespace: Option<String>,
    elements: HashMap<String, ElementDecl>,
    complex_types: HashMap<String, ComplexType>,
}

impl XmlSchema {
    /// Compile a schema document.
    pub fn parse(schema: &str) -> Result<Self, MatcherError> {
        let package = parser::parse(schema).map_err(|e| MatcherError::Parse {
            format: "xml schema",
            message: format!("invalid XML: {e:?}"),
        })?;
        let document = package.as_document();
        let root = document
            .root()
            .children()
            .into_iter()
            .find_map(|child| match child {
                ChildOfRoot::Element(e) => Some(e),
                _ => None,
            })
            .ok_or_else(|| schema_error("document has no root element"))?;

        if !is_xsd(root, "schema") {
            return Err(schema_error("root element is not xs:schema"));
        }
        SchemaCompiler::new(root)?.compile()
    }

    pub fn target_namespace(&self) -> Option<&str> {
        self.target_namespace.as_deref()
    }

    /// Validate a document, returning the first validation error.
    pub fn validate(&self, document: &str) -> Result<(), String> {
        let package = parser::parse(document).map_err(|e| format!("invalid XML: {e:?}"))?;
        let document = package.as_document();
        let root = document
            .root()
            .children()
            .into_iter()
            .find_map(|child| match child {
                ChildOfRoot::Element(e) => Some(e),
                _ => None,
            })
            .ok_or_else(|| "document has no root element".to_string())?;

        let name = root.name().local_part();
        if root.name().namespace_uri() != self.target_namespace.as_deref() {
            return Err(format!(
                "root element <{}> is not in namespace {}",
                name,
                self.target_namespace.as_deref().unwrap_or("(none)")
            ));
        }
        let decl = self
            .elements
            .get(name)
            .ok_or_else(|| format!("no global element declaration for <{name}>"))?;
        let validator = Validator {
            schema: self,
            depth: Cell::new(0),
        };
        validator.element(root, decl, &format!("/{name}"))
    }
}

fn schema_error(message: impl Into<String>) -> MatcherError {
    MatcherError::Parse {
        format: "xml schema",
        message: message.into(),
    }
}

fn is_xsd(element: Element<'_>, local: &str) -> bool {
    element.name().namespace_uri() == Some(XSD_NAMESPACE) && element.name().local_part() == local
}

fn element_children(element: Element<'_>) -> Vec<Element<'_>> {
    element
        .children()
        .into_iter()
        .filter_map(|child| match child {
            ChildOfElement::Element(e) => Some(e),
            _ => None,
        })
        .collect()
}

/// Schema children other than annotations.
fn schema_children(element: Element<'_>) -> Vec<Element<'_>> {
    element_children(element)
        .into_iter()
        .filter(|e| !is_xsd(*e, "annotation"))
        .collect()
}

/// Local part of a QName attribute value such as `xs:string`.
fn local_name(qname: &str) -> &str {
    qname.rsplit_once(':').map_or(qname, |(_, local)| local)
}

fn required_attribute<'d>(element: Element<'d>, name: &str) -> Result<&'d str, MatcherError> {
    element.attribute_value(name).ok_or_else(|| {
        schema_error(format!(
            "xs:{} is missing the {} attribute",
            element.name().local_part(),
            name
        ))
    })
}

fn parse_occurs(element: Element<'_>) -> Result<Occurs, MatcherError> {
    let min = match element.attribute_value("minOccurs") {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| schema_error(format!("invalid minOccurs '{v}'")))?,
        None => 1,
    };
    let max = match element.attribute_value("maxOccurs") {
        Some(v) if v.trim() == "unbounded" => None,
        Some(v) => Some(
            v.trim()
                .parse()
                .map_err(|_| schema_error(format!("invalid maxOccurs '{v}'")))?,
        ),
        None => Some(1),
    };
    if max.is_some_and(|max| max < min) {
        return Err(schema_error("maxOccurs is smaller than minOccurs"));
    }
    Ok(Occurs { min, max })
}

struct SchemaCompiler<'d> {
    simple_types: HashMap<String, Element<'d>>,
    complex_types: HashMap<String, Element<'d>>,
    elements: Vec<Element<'d>>,
    target_namespace: Option<String>,
}

impl<'d> SchemaCompiler<'d> {
    fn new(root: Element<'d>) -> Result<Self, MatcherError> {
        let mut compiler = Self {
            simple_types: HashMap::new(),
            complex_types: HashMap::new(),
            elements: Vec::new(),
            target_namespace: root.attribute_value("targetNamespace").map(str::to_string),
        };
        for child in schema_children(root) {
            let kind = child.name().local_part();
            match kind {
                "element" => compiler.elements.push(child),
                "simpleType" => {
                    let name = required_attribute(child, "name")?;
                    compiler.simple_types.insert(name.to_string(), child);
                }
                "complexType" => {
                    let name = required_attribute(child, "name")?;
                    compiler.complex_types.insert(name.to_string(), child);
                }
                other => return Err(schema_error(format!("unsupported schema construct xs:{other}"))),
            }
        }
        Ok(compiler)
    }

    fn compile(self) -> Result<XmlSchema, MatcherError> {
        let mut complex_types = HashMap::new();
        for (name, node) in &self.complex_types {
            complex_types.insert(name.clone(), self.complex_type(*node)?);
        }

        let mut elements = HashMap::new();
        for node in &self.elements {
            let decl = self.element_decl(*node)?;
            elements.insert(decl.name.clone(), decl);
        }

        let schema = XmlSchema {
            target_namespace: self.target_namespace,
            elements,
            complex_types,
        };
        check_refs(&schema)?;
        Ok(schema)
    }

    fn element_decl(&self, node: Element<'d>) -> Result<ElementDecl, MatcherError> {
        let name = required_attribute(node, "name")?.to_string();
        let inline = schema_children(node);

        let ty = if let Some(type_name) = node.attribute_value("type") {
            self.named_type(type_name)?
        } else {
            match inline.first() {
                Some(child) if is_xsd(*child, "complexType") => {
                    ElementType::Complex(Box::new(self.complex_type(*child)?))
                }
                Some(child) if is_xsd(*child, "simpleType") => {
                    ElementType::Simple(self.simple_type(*child, 0)?)
                }
                Some(child) => {
                    return Err(schema_error(format!(
                        "unsupported element content xs:{}",
                        child.name().local_part()
                    )))
                }
                None => ElementType::Any,
            }
        };
        Ok(ElementDecl { name, ty })
    }

    fn named_type(&self, qname: &str) -> Result<ElementType, MatcherError> {
        let local = local_name(qname);
        if self.complex_types.contains_key(local) {
            return Ok(ElementType::Named(local.to_string()));
        }
        if local == "anyType" {
            return Ok(ElementType::Any);
        }
        Ok(ElementType::Simple(self.simple_type_named(qname, 0)?))
    }

    fn simple_type_named(&self, qname: &str, depth: usize) -> Result<SimpleType, MatcherError> {
        let local = local_name(qname);
        if let Some(node) = self.simple_types.get(local) {
            return self.simple_type(*node, depth + 1);
        }
        BuiltIn::from_name(local)
            .map(SimpleType::built_in)
            .ok_or_else(|| schema_error(format!("unknown type {qname}")))
    }

    fn simple_type(&self, node: Element<'d>, depth: usize) -> Result<SimpleType, MatcherError> {
        if depth > MAX_DERIVATION_DEPTH {
            return Err(schema_error("simple type derivation is too deep or circular"));
        }
        let children = schema_children(node);
        let restriction = match children.as_slice() {
            [only] if is_xsd(*only, "restriction") => *only,
            [other, ..] => {
                return Err(schema_error(format!(
                    "unsupported simple type construct xs:{}",
                    other.name().local_part()
                )))
            }
            [] => return Err(schema_error("simple type has no restriction")),
        };

        let mut simple = self.simple_type_named(required_attribute(restriction, "base")?, depth)?;
        let facets = facets(restriction, simple.base)?;
        simple.restrictions.push(facets);
        Ok(simple)
    }

    fn complex_type(&self, node: Element<'d>) -> Result<ComplexType, MatcherError> {
        let mut complex = ComplexType {
            content: None,
            attributes: Vec::new(),
            mixed: node.attribute_value("mixed").is_some_and(|v| v == "true"),
        };
        for child in schema_children(node) {
            match child.name().local_part() {
                "sequence" | "choice" | "all" if complex.content.is_none() => {
                    complex.content = Some(self.particle(child)?);
                }
                "attribute" => complex.attributes.push(self.attribute(child)?),
                other => {
                    return Err(schema_error(format!(
                        "unsupported complex type construct xs:{other}"
                    )))
                }
            }
        }
        Ok(complex)
    }

    fn particle(&self, node: Element<'d>) -> Result<Particle, MatcherError> {
        let occurs = parse_occurs(node)?;
        match node.name().local_part() {
            "element" => match node.attribute_value("ref") {
                Some(target) => Ok(Particle::Ref {
                    name: local_name(target).to_string(),
                    occurs,
                }),
                None => Ok(Particle::Element {
                    decl: self.element_decl(node)?,
                    occurs,
                }),
            },
            kind @ ("sequence" | "choice" | "all") => {
                let items = schema_children(node)
                    .into_iter()
                    .map(|child| self.particle(child))
                    .collect::<Result<Vec<_>, _>>()?;
                match kind {
                    "sequence" => Ok(Particle::Sequence { items, occurs }),
                    "choice" => Ok(Particle::Choice { items, occurs }),
                    _ => {
                        if items.iter().any(|item| {
                            item.element_name().is_none() || item.occurs().max.map_or(true, |max| max > 1)
                        }) {
                            return Err(schema_error("xs:all may only contain elements occurring at most once"));
                        }
                        Ok(Particle::All { items, occurs })
                    }
                }
            }
            other => Err(schema_error(format!("unsupported particle xs:{other}"))),
        }
    }

    fn attribute(&self, node: Element<'d>) -> Result<AttributeDecl, MatcherError> {
        let name = required_attribute(node, "name")?.to_string();
        let ty = match node.attribute_value("type") {
            Some(type_name) => self.simple_type_named(type_name, 0)?,
            None => match schema_children(node).first() {
                Some(child) if is_xsd(*child, "simpleType") => self.simple_type(*child, 0)?,
                _ => SimpleType::built_in(BuiltIn::String),
            },
        };
        let required = match node.attribute_value("use") {
            None | Some("optional") => false,
            Some("required") => true,
            Some(other) => return Err(schema_error(format!("unsupported attribute use '{other}'"))),
        };
        Ok(AttributeDecl { name, ty, required })
    }
}

fn facets(restriction: Element<'_>, base: BuiltIn) -> Result<Facets, MatcherError> {
    let mut facets = Facets::default();
    for facet in schema_children(restriction) {
        let kind = facet.name().local_part();
        let value = required_attribute(facet, "value")?;
        let length = || {
            value
                .trim()
                .parse::<usize>()
                .map_err(|_| schema_error(format!("invalid {kind} '{value}'")))
        };
        let bound = || {
            if !base.is_numeric() {
                return Err(schema_error(format!("{kind} requires a numeric base type")));
            }
            parse_float(value.trim()).ok_or_else(|| schema_error(format!("invalid {kind} '{value}'")))
        };
        match kind {
            "enumeration" => facets.enumeration.push(value.to_string()),
            "pattern" => {
                let regex = Regex::new(&format!("^(?:{value})$"))?;
                facets.patterns.push(regex);
            }
            "length" => facets.length = Some(length()?),
            "minLength" => facets.min_length = Some(length()?),
            "maxLength" => facets.max_length = Some(length()?),
            "minInclusive" => facets.min_inclusive = Some(bound()?),
            "maxInclusive" => facets.max_inclusive = Some(bound()?),
            "minExclusive" => facets.min_exclusive = Some(bound()?),
            "maxExclusive" => facets.max_exclusive = Some(bound()?),
            other => return Err(schema_error(format!("unsupported facet xs:{other}"))),
        }
    }
    Ok(facets)
}

/// Every `ref` must name a global element.
fn check_refs(schema: &XmlSchema) -> Result<(), MatcherError> {
    fn walk_type(schema: &XmlSchema, ty: &ElementType) -> Result<(), MatcherError> {
        match ty {
            ElementType::Complex(complex) => walk_complex(schema, complex),
            _ => Ok(()),
        }
    }

    fn walk_complex(schema: &XmlSchema, complex: &ComplexType) -> Result<(), MatcherError> {
        complex
            .content
            .as_ref()
            .map_or(Ok(()), |content| walk_particle(schema, content))
    }

    fn walk_particle(schema: &XmlSchema, particle: &Particle) -> Result<(), MatcherError> {
        match particle {
            Particle::Ref { name, .. } if !schema.elements.contains_key(name) => {
                Err(schema_error(format!("reference to undeclared element {name}")))
            }
            Particle::Ref { .. } => Ok(()),
            Particle::Element { decl, .. } => walk_type(schema, &decl.ty),
            Particle::Sequence { items, .. } | Particle::Choice { items, .. } | Particle::All { items, .. } => {
                items.iter().try_for_each(|item| walk_particle(schema, item))
            }
        }
    }

    for decl in schema.elements.values() {
        walk_type(schema, &decl.ty)?;
    }
    for complex in schema.complex_types.values() {
        walk_complex(schema, complex)?;
    }
    Ok(())
}

struct Validator<'s> {
    schema: &'s XmlSchema,
    depth: Cell<usize>,
}

impl Validator<'_> {
    fn element(&self, element: Element<'_>, decl: &ElementDecl, path: &str) -> Result<(), String> {
        let depth = self.depth.get();
        if depth >= MAX_DOCUMENT_DEPTH {
            return Err(format!("{path}: document nested deeper than {MAX_DOCUMENT_DEPTH} elements"));
        }
        self.depth.set(depth + 1);
        let result = self.element_content(element, decl, path);
        self.depth.set(depth);
        result
    }

    fn element_content(&self, element: Element<'_>, decl: &ElementDecl, path: &str) -> Result<(), String> {
        match &decl.ty {
            ElementType::Any => Ok(()),
            ElementType::Simple(simple) => self.simple_element(element, simple, path),
            ElementType::Complex(complex) => self.complex_element(element, complex, path),
            ElementType::Named(name) => {
                let complex = self
                    .schema
                    .complex_types
                    .get(name)
                    .ok_or_else(|| format!("{path}: unknown type {name}"))?;
                self.complex_element(element, complex, path)
            }
        }
    }

    fn simple_element(&self, element: Element<'_>, simple: &SimpleType, path: &str) -> Result<(), String> {
        if let Some(attribute) = element.attributes().into_iter().find(|a| !is_special(a.name())) {
            return Err(format!(
                "{path}: attribute {} is not allowed",
                attribute.name().local_part()
            ));
        }
        let mut text = String::new();
        for child in element.children() {
            match child {
                ChildOfElement::Element(e) => {
                    return Err(format!(
                        "{path}: element <{}> is not allowed in simple content",
                        e.name().local_part()
                    ))
                }
                ChildOfElement::Text(t) => text.push_str(t.text()),
                _ => {}
            }
        }
        simple.check(&text).map_err(|e| format!("{path}: {e}"))
    }

    fn complex_element(&self, element: Element<'_>, complex: &ComplexType, path: &str) -> Result<(), String> {
        self.attributes(element, complex, path)?;

        let mut children = Vec::new();
        for child in element.children() {
            match child {
                ChildOfElement::Element(e) => children.push(e),
                ChildOfElement::Text(t) if !complex.mixed && !t.text().trim().is_empty() => {
                    return Err(format!("{path}: text content is not allowed"));
                }
                _ => {}
            }
        }

        let consumed = match &complex.content {
            Some(content) => self.particle(content, &children, 0, path)?,
            None => 0,
        };
        match children.get(consumed) {
            Some(extra) => Err(format!(
                "{path}: unexpected element <{}>",
                extra.name().local_part()
            )),
            None => Ok(()),
        }
    }

    fn attributes(&self, element: Element<'_>, complex: &ComplexType, path: &str) -> Result<(), String> {
        let mut seen = HashSet::new();
        for attribute in element.attributes() {
            if is_special(attribute.name()) {
                continue;
            }
            let name = attribute.name().local_part();
            let decl = complex
                .attributes
                .iter()
                .find(|decl| decl.name == name)
                .ok_or_else(|| format!("{path}: attribute {name} is not allowed"))?;
            decl.ty
                .check(attribute.value())
                .map_err(|e| format!("{path}/@{name}: {e}"))?;
            seen.insert(name);
        }
        match complex
            .attributes
            .iter()
            .find(|decl| decl.required && !seen.contains(decl.name.as_str()))
        {
            Some(missing) => Err(format!("{path}: missing required attribute {}", missing.name)),
            None => Ok(()),
        }
    }

    /// Match `particle` from `pos`, returning the position after it.
    fn particle(&self, particle: &Particle, children: &[Element<'_>], pos: usize, path: &str) -> Result<usize, String> {
        match particle {
            Particle::Element { decl, occurs } => self.elements(decl, *occurs, children, pos, path),
            Particle::Ref { name, occurs } => {
                let decl = self
                    .schema
                    .elements
                    .get(name)
                    .ok_or_else(|| format!("{path}: unknown element {name}"))?;
                self.elements(decl, *occurs, children, pos, path)
            }
            Particle::Sequence { items, occurs } => repeat(*occurs, pos, |mut at| {
                for item in items {
                    at = self.particle(item, children, at, path)?;
                }
                Ok(at)
            }),
            Particle::Choice { items, occurs } => {
                repeat(*occurs, pos, |at| self.choice(items, children, at, path))
            }
            Particle::All { items, occurs } => repeat(*occurs, pos, |at| self.all(items, children, at, path)),
        }
    }

    fn elements(
        &self,
        decl: &ElementDecl,
        occurs: Occurs,
        children: &[Element<'_>],
        pos: usize,
        path: &str,
    ) -> Result<usize, String> {
        let mut at = pos;
        let mut count = 0;
        while occurs.max.map_or(true, |max| count < max) {
            match children.get(at) {
                Some(child) if self.named(*child, &decl.name) => {
                    self.element(*child, decl, &format!("{path}/{}", decl.name))?;
                    at += 1;
                    count += 1;
                }
                _ => break,
            }
        }
        if count < occurs.min {
            return Err(format!(
                "{path}: expected element <{}> but found {}",
                decl.name,
                describe(children.get(at))
            ));
        }
        Ok(at)
    }

    fn choice(&self, items: &[Particle], children: &[Element<'_>], pos: usize, path: &str) -> Result<usize, String> {
        if let Some(current) = children.get(pos) {
            let name = current.name().local_part();
            if let Some(item) = items.iter().find(|item| item.can_start_with(name)) {
                return self.particle(item, children, pos, path);
            }
        }
        if items.iter().any(Particle::emptiable) {
            return Ok(pos);
        }
        Err(format!(
            "{path}: no choice alternative matches {}",
            describe(children.get(pos))
        ))
    }

    fn all(&self, items: &[Particle], children: &[Element<'_>], pos: usize, path: &str) -> Result<usize, String> {
        let mut seen = vec![false; items.len()];
        let mut at = pos;
        while let Some(child) = children.get(at) {
            let Some(index) = items
                .iter()
                .enumerate()
                .position(|(i, item)| !seen[i] && item.element_name().is_some_and(|n| self.named(*child, n)))
            else {
                break;
            };
            self.particle(&items[index], children, at, path)?;
            seen[index] = true;
            at += 1;
        }
        for (item, seen) in items.iter().zip(&seen) {
            if !seen && item.occurs().min > 0 {
                return Err(format!(
                    "{path}: missing element <{}>",
                    item.element_name().unwrap_or_default()
                ));
            }
        }
        Ok(at)
    }

    fn named(&self, element: Element<'_>, name: &str) -> bool {
        element.name().local_part() == name
            && match element.name().namespace_uri() {
                None => true,
                Some(ns) => self.schema.target_namespace.as_deref() == Some(ns),
            }
    }
}

/// Apply `once` between `occurs.min` and `occurs.max` times.
fn repeat(occurs: Occurs, pos: usize, mut once: impl FnMut(usize) -> Result<usize, String>) -> Result<usize, String> {
    let mut at = pos;
    let mut count = 0;
    while occurs.max.map_or(true, |max| count < max) {
        match once(at) {
            Ok(next) => {
                let progressed = next > at;
                at = next;
                count += 1;
                if !progressed {
                    break;
                }
            }
            Err(e) if count < occurs.min => return Err(e),
            Err(_) => break,
        }
    }
    Ok(at)
}

/// Namespace declarations and `xsi:` attributes are not validated.
fn is_special(name: QName<'_>) -> bool {
    match name.namespace_uri() {
        Some(XSI_NAMESPACE) | Some(XMLNS_NAMESPACE) => true,
        Some(_) => false,
        None => name.local_part() == "xmlns",
    }
}

fn describe(element: Option<&Element<'_>>) -> String {
    match element {
        Some(e) => format!("<{}>", e.name().local_part()),
        None => "end of content".to_string(),
    }
}

/// Matches XML bodies that validate against a schema.
#[derive(Debug)]
pub struct XmlSchemaMatcher {
    pattern: String,
    compiled: OnceCell<Result<XmlSchema, String>>,
}

impl XmlSchemaMatcher {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            compiled: OnceCell::new(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.pattern.trim().is_empty()
    }

    fn schema(&self) -> &Result<XmlSchema, String> {
        self.compiled.get_or_init(|| {
            XmlSchema::parse(&self.pattern).map_err(|e| {
                warn!("XML schema failed to compile, it will never match: {}", e);
                e.to_string()
            })
        })
    }

    pub fn matches(&self, mut diagnostics: Option<&mut MatchDiagnostics>, candidate: Option<&str>) -> bool {
        if let Some(result) = precheck(diagnostics.as_deref_mut(), self.is_blank(), candidate) {
            return result;
        }
        let Some(candidate) = candidate else {
            return false;
        };

        let schema = match self.schema() {
            Ok(schema) => schema,
            Err(e) => {
                diff!(diagnostics, FieldName::Body, "xml schema is invalid: {}", e);
                return false;
            }
        };
        match schema.validate(candidate) {
            Ok(()) => true,
            Err(e) => {
                diff!(
                    diagnostics,
                    FieldName::Body,
                    "xml schema match failed found: {} failed because: {}",
                    candidate,
                    e
                );
                false
            }
        }
    }
}
