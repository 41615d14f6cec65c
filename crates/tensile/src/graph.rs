//! Graph model: element types, shapes, tensor views, literals, nodes, and
//! functions.
//!
//! A [`Graph`] is an arena of [`Node`]s addressed by [`NodeId`]. Edges are
//! `(node, output index)` pairs, so the structure is acyclic by construction
//! when built through the arena API: an input can only reference a node that
//! already exists. A [`Function`] names an ordered parameter list and a single
//! result node inside one graph.

use std::{
    fmt, fs, io,
    path::Path,
    sync::{Arc, OnceLock},
};

use serde::{ser::SerializeStruct, Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

use crate::passes::{topological_order, GraphValidationError};

/// Scalar element types supported by the compilation core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    F32,
    F64,
    I32,
    I64,
}

impl DType {
    /// Storage size of one element in bytes.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::F32 | DType::I32 => 4,
            DType::F64 | DType::I64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }

    pub fn name(self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::I32 => "i32",
            DType::I64 => "i64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Static tensor shape. Scalars have rank zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self { dims: dims.into() }
    }

    pub fn scalar() -> Self {
        Self { dims: Vec::new() }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn dim(&self, axis: usize) -> usize {
        self.dims[axis]
    }

    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// Total number of elements (1 for scalars), or `None` when the product
    /// overflows `usize`.
    pub fn element_count(&self) -> Option<usize> {
        let mut count: usize = 1;
        for &dim in &self.dims {
            count = count.checked_mul(dim)?;
        }
        Some(count)
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::new(dims.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Shape::new(dims.to_vec())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, dim) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{dim}")?;
        }
        write!(f, "]")
    }
}

/// Element type plus shape: the logical type of one tensor value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueType {
    pub dtype: DType,
    pub shape: Shape,
}

impl ValueType {
    pub fn new(dtype: DType, shape: impl Into<Shape>) -> Self {
        Self {
            dtype,
            shape: shape.into(),
        }
    }

    pub fn element_count(&self) -> Option<usize> {
        self.shape.element_count()
    }

    /// Packed byte size, or `None` when it overflows `usize`.
    pub fn byte_len(&self) -> Option<usize> {
        self.element_count()?
            .checked_mul(self.dtype.size_in_bytes())
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.dtype, self.shape)
    }
}

/// Concrete dense memory arrangement for a tensor view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Per-axis strides in elements.
    pub strides: Vec<usize>,
    pub size_in_bytes: usize,
}

/// Identity of a [`TensorView`] within one graph, assigned densely in
/// creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ViewId(pub u32);

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A typed, shaped tensor value descriptor.
///
/// Views are shared (`Arc`) between the owning output descriptor and anything
/// downstream that resolved it, such as slot tables and call frames. The
/// layout is bound at most once, during layout assignment, and is immutable
/// afterwards.
#[derive(Debug, Serialize, Deserialize)]
pub struct TensorView {
    pub id: ViewId,
    pub ty: ValueType,
    #[serde(skip)]
    layout: OnceLock<Layout>,
}

impl TensorView {
    fn new(id: ViewId, ty: ValueType) -> Self {
        Self {
            id,
            ty,
            layout: OnceLock::new(),
        }
    }

    pub fn dtype(&self) -> DType {
        self.ty.dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.ty.shape
    }

    pub fn layout(&self) -> Option<&Layout> {
        self.layout.get()
    }

    /// Binds the concrete layout. The first binding wins; later calls return
    /// the already-bound layout unchanged.
    pub fn bind_layout(&self, layout: Layout) -> &Layout {
        self.layout.get_or_init(|| layout)
    }
}

impl PartialEq for TensorView {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.ty == other.ty
    }
}

/// Rejected value construction: sizes no address space can hold, or literal
/// data that does not match its declared type.
#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("{ty} overflows the addressable byte size")]
    OversizedType { ty: ValueType },
    #[error("literal for {ty} holds {got} bytes, expected {expected}")]
    LiteralByteCount {
        ty: ValueType,
        expected: usize,
        got: usize,
    },
    #[error("literal for {ty} holds {got} elements, expected {expected}")]
    LiteralElementCount {
        ty: ValueType,
        expected: usize,
        got: usize,
    },
}

/// Dense tensor data: packed little-endian elements.
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub ty: ValueType,
    pub bytes: Arc<[u8]>,
}

impl Literal {
    /// Wraps pre-packed bytes, rejecting lengths that do not match the value
    /// type.
    pub fn new(ty: ValueType, bytes: Arc<[u8]>) -> Result<Self, GraphError> {
        let expected = ty
            .byte_len()
            .ok_or_else(|| GraphError::OversizedType { ty: ty.clone() })?;
        if bytes.len() != expected {
            return Err(GraphError::LiteralByteCount {
                ty,
                expected,
                got: bytes.len(),
            });
        }
        Ok(Self { ty, bytes })
    }

    pub fn zeros(ty: ValueType) -> Result<Self, GraphError> {
        let byte_len = ty
            .byte_len()
            .ok_or_else(|| GraphError::OversizedType { ty: ty.clone() })?;
        let bytes: Arc<[u8]> = vec![0u8; byte_len].into();
        Ok(Self { ty, bytes })
    }

    fn from_elements(ty: ValueType, count: usize, bytes: Vec<u8>) -> Result<Self, GraphError> {
        let expected = ty
            .element_count()
            .ok_or_else(|| GraphError::OversizedType { ty: ty.clone() })?;
        if count != expected {
            return Err(GraphError::LiteralElementCount {
                ty,
                expected,
                got: count,
            });
        }
        Ok(Self {
            ty,
            bytes: bytes.into(),
        })
    }

    pub fn from_f32(shape: impl Into<Shape>, values: &[f32]) -> Result<Self, GraphError> {
        let ty = ValueType::new(DType::F32, shape);
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::from_elements(ty, values.len(), bytes)
    }

    pub fn from_f64(shape: impl Into<Shape>, values: &[f64]) -> Result<Self, GraphError> {
        let ty = ValueType::new(DType::F64, shape);
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::from_elements(ty, values.len(), bytes)
    }

    pub fn from_i32(shape: impl Into<Shape>, values: &[i32]) -> Result<Self, GraphError> {
        let ty = ValueType::new(DType::I32, shape);
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::from_elements(ty, values.len(), bytes)
    }

    pub fn from_i64(shape: impl Into<Shape>, values: &[i64]) -> Result<Self, GraphError> {
        let ty = ValueType::new(DType::I64, shape);
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::from_elements(ty, values.len(), bytes)
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_all_zero(&self) -> bool {
        self.bytes.iter().all(|b| *b == 0)
    }
}

impl Serialize for Literal {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("Literal", 2)?;
        state.serialize_field("ty", &self.ty)?;
        state.serialize_field("bytes", &self.bytes.as_ref())?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for Literal {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct LiteralHelper {
            ty: ValueType,
            bytes: Vec<u8>,
        }

        let helper = LiteralHelper::deserialize(deserializer)?;
        Ok(Literal {
            ty: helper.ty,
            bytes: Arc::<[u8]>::from(helper.bytes),
        })
    }
}

/// Unique identifier of a node inside its graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// The closed set of operation tags; drives dispatch in every pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    Parameter,
    Constant,
    Add,
    Subtract,
    Multiply,
    Divide,
    Negative,
    Abs,
    Sign,
    Maximum,
    Dot,
    Tuple,
}

impl OpKind {
    pub fn name(self) -> &'static str {
        match self {
            OpKind::Parameter => "parameter",
            OpKind::Constant => "constant",
            OpKind::Add => "add",
            OpKind::Subtract => "subtract",
            OpKind::Multiply => "multiply",
            OpKind::Divide => "divide",
            OpKind::Negative => "negative",
            OpKind::Abs => "abs",
            OpKind::Sign => "sign",
            OpKind::Maximum => "maximum",
            OpKind::Dot => "dot",
            OpKind::Tuple => "tuple",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An input edge: one specific output of one predecessor node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Input {
    pub node: NodeId,
    pub index: usize,
}

impl Input {
    pub fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }
}

/// Output descriptor owned by exactly one node.
///
/// `ty` is resolved by type propagation (or declared for parameters and
/// constants); `view` is attached by tensor assignment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Output {
    pub ty: Option<ValueType>,
    pub view: Option<Arc<TensorView>>,
}

impl Output {
    fn untyped() -> Self {
        Self {
            ty: None,
            view: None,
        }
    }

    fn typed(ty: ValueType) -> Self {
        Self {
            ty: Some(ty),
            view: None,
        }
    }
}

/// One vertex of the computation DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub kind: OpKind,
    pub inputs: SmallVec<[Input; 2]>,
    pub outputs: Vec<Output>,
    /// Payload for `Constant` nodes, `None` for every other kind.
    pub literal: Option<Literal>,
}

impl Node {
    pub fn output_ty(&self, index: usize) -> Option<&ValueType> {
        self.outputs.get(index).and_then(|o| o.ty.as_ref())
    }

    pub fn output_view(&self, index: usize) -> Option<&Arc<TensorView>> {
        self.outputs.get(index).and_then(|o| o.view.as_ref())
    }
}

/// Arena of nodes plus the view id counter for this graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    nodes: Vec<Node>,
    next_view: u32,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    /// Resolves an input edge to the producing output's type, if propagated.
    pub fn input_ty(&self, input: Input) -> Option<&ValueType> {
        self.node(input.node).output_ty(input.index)
    }

    /// Resolves an input edge to the producing output's view, if assigned.
    pub fn input_view(&self, input: Input) -> Option<&Arc<TensorView>> {
        self.node(input.node).output_view(input.index)
    }

    /// Allocates a fresh shared view with the next dense id.
    pub fn new_view(&mut self, ty: ValueType) -> Arc<TensorView> {
        let id = ViewId(self.next_view);
        self.next_view += 1;
        Arc::new(TensorView::new(id, ty))
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn parameter(&mut self, dtype: DType, shape: impl Into<Shape>) -> NodeId {
        self.push(Node {
            kind: OpKind::Parameter,
            inputs: SmallVec::new(),
            outputs: vec![Output::typed(ValueType::new(dtype, shape))],
            literal: None,
        })
    }

    pub fn constant(&mut self, literal: Literal) -> NodeId {
        let ty = literal.ty.clone();
        self.push(Node {
            kind: OpKind::Constant,
            inputs: SmallVec::new(),
            outputs: vec![Output::typed(ty)],
            literal: Some(literal),
        })
    }

    fn unary(&mut self, kind: OpKind, x: NodeId) -> NodeId {
        self.push(Node {
            kind,
            inputs: SmallVec::from_slice(&[Input::new(x, 0)]),
            outputs: vec![Output::untyped()],
            literal: None,
        })
    }

    fn binary(&mut self, kind: OpKind, a: NodeId, b: NodeId) -> NodeId {
        self.push(Node {
            kind,
            inputs: SmallVec::from_slice(&[Input::new(a, 0), Input::new(b, 0)]),
            outputs: vec![Output::untyped()],
            literal: None,
        })
    }

    pub fn add(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(OpKind::Add, a, b)
    }

    pub fn subtract(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(OpKind::Subtract, a, b)
    }

    pub fn multiply(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(OpKind::Multiply, a, b)
    }

    pub fn divide(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(OpKind::Divide, a, b)
    }

    pub fn negative(&mut self, x: NodeId) -> NodeId {
        self.unary(OpKind::Negative, x)
    }

    pub fn abs(&mut self, x: NodeId) -> NodeId {
        self.unary(OpKind::Abs, x)
    }

    pub fn sign(&mut self, x: NodeId) -> NodeId {
        self.unary(OpKind::Sign, x)
    }

    pub fn maximum(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(OpKind::Maximum, a, b)
    }

    pub fn dot(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(OpKind::Dot, a, b)
    }

    pub fn tuple(&mut self, elements: &[NodeId]) -> NodeId {
        self.push(Node {
            kind: OpKind::Tuple,
            inputs: elements.iter().map(|&n| Input::new(n, 0)).collect(),
            outputs: (0..elements.len()).map(|_| Output::untyped()).collect(),
            literal: None,
        })
    }
}

/// A named, immutable computation: ordered parameters, one result node, and
/// the graph reachable backward from that result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    name: String,
    graph: Graph,
    parameters: Vec<NodeId>,
    result: NodeId,
}

impl Function {
    /// Assembles a function from an existing graph, validating that every
    /// listed parameter is a `Parameter` node.
    pub fn from_parts(
        name: impl Into<String>,
        graph: Graph,
        parameters: Vec<NodeId>,
        result: NodeId,
    ) -> Result<Self, GraphValidationError> {
        for &param in &parameters {
            if graph.node(param).kind != OpKind::Parameter {
                return Err(GraphValidationError::InvalidParameters {
                    message: format!("{param} is not a parameter node"),
                });
            }
        }
        Ok(Self {
            name: name.into(),
            graph,
            parameters,
            result,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub(crate) fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn parameters(&self) -> &[NodeId] {
        &self.parameters
    }

    pub fn result(&self) -> NodeId {
        self.result
    }

    /// Number of result values (outputs of the result node).
    pub fn result_arity(&self) -> usize {
        self.graph.node(self.result).outputs.len()
    }

    pub fn to_json_string(&self) -> Result<String, FunctionSerdeError> {
        serde_json::to_string_pretty(self).map_err(FunctionSerdeError::from)
    }

    pub fn from_json_str(src: &str) -> Result<Self, FunctionSerdeError> {
        serde_json::from_str(src).map_err(FunctionSerdeError::from)
    }

    pub fn to_bincode_bytes(&self) -> Result<Vec<u8>, FunctionSerdeError> {
        bincode::serialize(self).map_err(FunctionSerdeError::from)
    }

    pub fn from_bincode_slice(bytes: &[u8]) -> Result<Self, FunctionSerdeError> {
        bincode::deserialize(bytes).map_err(FunctionSerdeError::from)
    }

    pub fn save_bincode<P: AsRef<Path>>(&self, path: P) -> Result<(), FunctionIoError> {
        let bytes = self.to_bincode_bytes()?;
        fs::write(path, bytes).map_err(FunctionIoError::from)
    }

    pub fn load_bincode<P: AsRef<Path>>(path: P) -> Result<Self, FunctionIoError> {
        let bytes = fs::read(path).map_err(FunctionIoError::from)?;
        Function::from_bincode_slice(&bytes).map_err(FunctionIoError::from)
    }

    pub fn to_text(&self) -> String {
        format!("{self}")
    }
}

#[derive(Debug, Error)]
pub enum FunctionSerdeError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
}

#[derive(Debug, Error)]
pub enum FunctionIoError {
    #[error(transparent)]
    Serialization(#[from] FunctionSerdeError),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

fn write_line(f: &mut fmt::Formatter<'_>, indent: usize, text: &str) -> fmt::Result {
    writeln!(f, "{:indent$}{text}", "", indent = indent * 2)
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_line(f, 0, &format!("func @{} {{", self.name))?;
        let params = self
            .parameters
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write_line(f, 1, &format!("params: {params}"))?;
        // Reachable nodes in topological order; arena order if the graph is
        // malformed (Display cannot fail).
        let order = topological_order(&self.graph, &[self.result])
            .unwrap_or_else(|_| self.graph.ids().collect());
        for id in order {
            let node = self.graph.node(id);
            let operands = node
                .inputs
                .iter()
                .map(|i| {
                    if i.index == 0 {
                        i.node.to_string()
                    } else {
                        format!("{}.{}", i.node, i.index)
                    }
                })
                .collect::<Vec<_>>()
                .join(", ");
            let tys = node
                .outputs
                .iter()
                .map(|o| match &o.ty {
                    Some(ty) => ty.to_string(),
                    None => "?".to_string(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            write_line(f, 1, &format!("{id} = {}({operands}) : {tys}", node.kind))?;
        }
        write_line(f, 1, &format!("result: {}", self.result))?;
        write_line(f, 0, "}")
    }
}

/// Incremental front-end for building a [`Function`].
#[derive(Debug, Default)]
pub struct FunctionBuilder {
    name: String,
    graph: Graph,
    parameters: Vec<NodeId>,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            graph: Graph::new(),
            parameters: Vec::new(),
        }
    }

    pub fn parameter(&mut self, dtype: DType, shape: impl Into<Shape>) -> NodeId {
        let id = self.graph.parameter(dtype, shape);
        self.parameters.push(id);
        id
    }

    pub fn constant(&mut self, literal: Literal) -> NodeId {
        self.graph.constant(literal)
    }

    pub fn add(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.graph.add(a, b)
    }

    pub fn subtract(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.graph.subtract(a, b)
    }

    pub fn multiply(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.graph.multiply(a, b)
    }

    pub fn divide(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.graph.divide(a, b)
    }

    pub fn negative(&mut self, x: NodeId) -> NodeId {
        self.graph.negative(x)
    }

    pub fn abs(&mut self, x: NodeId) -> NodeId {
        self.graph.abs(x)
    }

    pub fn sign(&mut self, x: NodeId) -> NodeId {
        self.graph.sign(x)
    }

    pub fn maximum(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.graph.maximum(a, b)
    }

    pub fn dot(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.graph.dot(a, b)
    }

    pub fn tuple(&mut self, elements: &[NodeId]) -> NodeId {
        self.graph.tuple(elements)
    }

    /// Finishes the function with `result` as its result node.
    pub fn build(self, result: NodeId) -> Result<Function, GraphValidationError> {
        Function::from_parts(self.name, self.graph, self.parameters, result)
    }
}
