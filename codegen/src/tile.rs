//! Square tile / outer-product expansion.
//!
//! A tile is a C struct of `lanes` vector rows (`HwyTileF32x4 { float32x4_t rows[4]; }`).
//! Every tile op unrolls into one statement per row. Targets with lane-indexed ops
//! (`vfmaq_laneq_f32`) use a single instruction per row; everything else broadcasts the
//! row's lane and goes through the regular FMA or mul + sub lowering.

use simdgen_dtype::ElemType;
use simdgen_ir::VecOp;

use crate::emit::{Emit, Unsupported, call};
use crate::select::Selector;

/// A tile value in scope, by variable name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    pub name: String,
    pub dim: usize,
}

impl Tile {
    pub fn row(&self, i: impl std::fmt::Display) -> String {
        format!("{}.rows[{i}]", self.name)
    }
}

pub struct TileEmitter<'s, 'p> {
    sel: &'s mut Selector<'p>,
}

impl<'s, 'p> TileEmitter<'s, 'p> {
    pub fn new(sel: &'s mut Selector<'p>) -> Self {
        Self { sel }
    }

    fn dim(&self) -> Result<usize, Unsupported> {
        let spec = self.sel.spec();
        if spec.is_dynamic() {
            return Err(Unsupported(format!("tiles need a fixed vector width, {} lanes are runtime", spec.lanes_expr())));
        }
        Ok(spec.lanes)
    }

    /// `HwyTile<ELEM>x<lanes>`.
    pub fn type_name(&self) -> Result<String, Unsupported> {
        let profile = self.sel.profile();
        let elem = match profile.elem {
            ElemType::Float32 => "F32",
            ElemType::Float64 => "F64",
            other => return Err(Unsupported(format!("tiles of {other}"))),
        };
        Ok(format!("HwyTile{elem}x{}", self.dim()?))
    }

    pub fn typedef(&self) -> Result<Vec<Emit>, Unsupported> {
        let name = self.type_name()?;
        Ok(vec![
            Emit::open("typedef struct"),
            Emit::stmt(format!("{} rows[{}]", self.sel.vec_type(), self.dim()?)),
            Emit::CloseAs(name),
        ])
    }

    /// Declare a tile variable, uninitialized.
    pub fn declare(&self, name: &str) -> Result<(Tile, Emit), Unsupported> {
        let tile = Tile { name: name.to_string(), dim: self.dim()? };
        Ok((tile, Emit::stmt(format!("{} {name}", self.type_name()?))))
    }

    pub fn zero(&mut self, tile: &Tile) -> Result<Vec<Emit>, Unsupported> {
        let zero = self.sel.zero()?;
        Ok((0..tile.dim).map(|i| Emit::stmt(format!("{} = {zero}", tile.row(i)))).collect())
    }

    /// `rows[i] += row[i] * col` (or `-=` when `subtract`).
    pub fn outer_product(&mut self, tile: &Tile, row: &str, col: &str, subtract: bool) -> Result<Vec<Emit>, Unsupported> {
        let lane_ops = self.sel.profile().lane_ops;
        (0..tile.dim)
            .map(|i| {
                let acc = tile.row(i);
                let lane = i.to_string();
                let value = match (lane_ops, subtract) {
                    (Some(ops), false) => call(ops.fma_lane, &[acc.clone(), col.to_string(), row.to_string(), lane]),
                    (Some(ops), true) => {
                        let product = call(ops.mul_lane, &[col.to_string(), row.to_string(), lane]);
                        self.sel.binary(VecOp::Sub, &acc, &product)?
                    }
                    (None, _) => {
                        let scalar = self.sel.get_lane(row, &lane)?;
                        let bcast = self.sel.dup(&scalar)?;
                        if subtract {
                            let product = self.sel.binary(VecOp::Mul, &bcast, col)?;
                            self.sel.binary(VecOp::Sub, &acc, &product)?
                        } else {
                            self.sel.mul_add(&bcast, col, &acc)?
                        }
                    }
                };
                Ok(Emit::stmt(format!("{acc} = {value}")))
            })
            .collect()
    }

    /// Store row `idx` to `dst`.
    pub fn store_row(&mut self, tile: &Tile, idx: &str, dst: &str) -> Result<Emit, Unsupported> {
        let addr = self.sel.address(dst, "0");
        Ok(Emit::stmt(self.sel.store(&addr, &tile.row(idx))?))
    }

    pub fn read_row(&self, tile: &Tile, idx: &str) -> String {
        tile.row(idx)
    }

    /// Set lane `idx` of every row from `src[row]`, i.e. write column `idx`.
    pub fn load_col(&mut self, tile: &Tile, idx: &str, src: &str) -> Result<Vec<Emit>, Unsupported> {
        let profile = self.sel.profile();
        if let Some(ops) = profile.lane_ops {
            return Ok((0..tile.dim)
                .map(|i| {
                    let row = tile.row(i);
                    Emit::stmt(format!("{row} = {}", call(ops.set_lane, &[format!("{src}[{i}]"), row.clone(), idx.to_string()])))
                })
                .collect());
        }
        if profile.needs_predicate() {
            return Err(Unsupported(format!("{} on {} {}", VecOp::LoadCol, profile.target, profile.elem)));
        }

        // No lane insert: round-trip each row through a stack buffer.
        let buf = format!("{}_col", tile.name);
        let mut out = vec![Emit::open(""), Emit::stmt(format!("{} {buf}[{}]", profile.scalar_type, tile.dim))];
        for i in 0..tile.dim {
            let row = tile.row(i);
            out.push(Emit::stmt(self.sel.store(&buf, &row)?));
            out.push(Emit::stmt(format!("{buf}[{idx}] = {src}[{i}]")));
            out.push(Emit::stmt(format!("{row} = {}", self.sel.load(&buf)?)));
        }
        out.push(Emit::Close);
        Ok(out)
    }

    /// Dispatch a tile op. `args` excludes the tile itself.
    pub fn apply(&mut self, op: VecOp, tile: &Tile, args: &[String]) -> Result<Vec<Emit>, Unsupported> {
        let a = |i: usize| args.get(i).map(String::as_str).ok_or_else(|| Unsupported(format!("{op}: missing operand {i}")));
        match op {
            VecOp::TileZero => self.zero(tile),
            VecOp::OuterProductAdd => self.outer_product(tile, a(0)?, a(1)?, false),
            VecOp::OuterProductSub => self.outer_product(tile, a(0)?, a(1)?, true),
            VecOp::StoreRow => Ok(vec![self.store_row(tile, a(0)?, a(1)?)?]),
            VecOp::LoadCol => self.load_col(tile, a(0)?, a(1)?),
            VecOp::ReadRow => Err(Unsupported(format!("{op} is an expression, not a statement"))),
            other => Err(Unsupported(format!("{other} is not a tile op"))),
        }
    }
}
