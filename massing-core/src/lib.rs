pub mod units {
    use std::fmt;

    use serde::{Deserialize, Serialize};

    pub const FEET_PER_METER: f64 = 3.28084;

    /// 显示单位制。模型内部始终以米存储，切换单位制只影响展示与输入换算。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum UnitSystem {
        #[default]
        Metric,
        Imperial,
    }

    impl UnitSystem {
        #[inline]
        pub fn length_suffix(self) -> &'static str {
            match self {
                UnitSystem::Metric => "m",
                UnitSystem::Imperial => "ft",
            }
        }

        #[inline]
        pub fn area_suffix(self) -> &'static str {
            match self {
                UnitSystem::Metric => "m²",
                UnitSystem::Imperial => "ft²",
            }
        }

        pub fn as_str(self) -> &'static str {
            match self {
                UnitSystem::Metric => "metric",
                UnitSystem::Imperial => "imperial",
            }
        }
    }

    impl fmt::Display for UnitSystem {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    /// 米 -> 显示长度。
    #[inline]
    pub fn to_display_length(meters: f64, units: UnitSystem) -> f64 {
        match units {
            UnitSystem::Metric => meters,
            UnitSystem::Imperial => meters * FEET_PER_METER,
        }
    }

    /// 显示长度 -> 米，用于把用户输入写回模型。
    #[inline]
    pub fn from_display_length(value: f64, units: UnitSystem) -> f64 {
        match units {
            UnitSystem::Metric => value,
            UnitSystem::Imperial => value / FEET_PER_METER,
        }
    }

    #[inline]
    pub fn to_display_area(square_meters: f64, units: UnitSystem) -> f64 {
        match units {
            UnitSystem::Metric => square_meters,
            UnitSystem::Imperial => square_meters * FEET_PER_METER * FEET_PER_METER,
        }
    }

    /// 面积取整并加千分位，例如 `12,345 m²`。
    pub fn format_area(square_meters: f64, units: UnitSystem) -> String {
        let rounded = to_display_area(square_meters, units).round() as i64;
        format!("{} {}", group_thousands(rounded), units.area_suffix())
    }

    fn group_thousands(value: i64) -> String {
        let digits = value.unsigned_abs().to_string();
        let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
        if value < 0 {
            out.push('-');
        }
        for (index, ch) in digits.chars().enumerate() {
            if index > 0 && (digits.len() - index) % 3 == 0 {
                out.push(',');
            }
            out.push(ch);
        }
        out
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn length_conversion_is_reversible() {
            let feet = to_display_length(10.0, UnitSystem::Imperial);
            assert!((feet - 32.8084).abs() < 1e-9);
            let meters = from_display_length(feet, UnitSystem::Imperial);
            assert!((meters - 10.0).abs() < 1e-12);
            assert_eq!(to_display_length(7.5, UnitSystem::Metric), 7.5);
        }

        #[test]
        fn format_area_groups_thousands() {
            assert_eq!(format_area(12_345.4, UnitSystem::Metric), "12,345 m²");
            assert_eq!(format_area(999.6, UnitSystem::Metric), "1,000 m²");
            assert_eq!(format_area(0.0, UnitSystem::Metric), "0 m²");
            assert_eq!(format_area(100.0, UnitSystem::Imperial), "1,076 ft²");
        }

        #[test]
        fn units_serialize_lowercase() {
            let json = serde_json::to_string(&UnitSystem::Imperial).unwrap();
            assert_eq!(json, "\"imperial\"");
        }
    }
}

pub mod geometry {
    use glam::{DQuat, DVec2, DVec3, EulerRot};
    use serde::{Deserialize, Serialize};
    use xxhash_rust::xxh32::xxh32;

    const NOISE_SEED: u32 = 0x6d61_7373;

    /// 局部平面坐标点（米），内部以 `glam::DVec2` 表示。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn is_finite(self) -> bool {
            self.0.is_finite()
        }

        /// 两点在每个轴上的差值都不超过 `epsilon`。
        #[inline]
        pub fn approx_eq(self, other: Point2, epsilon: f64) -> bool {
            (self.x() - other.x()).abs() <= epsilon && (self.y() - other.y()).abs() <= epsilon
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self(value)
        }
    }

    /// 鞋带公式计算有向面积，开环与闭环（首尾重复）结果相同。
    pub fn signed_area(points: &[Point2]) -> f64 {
        if points.len() < 3 {
            return 0.0;
        }
        let mut twice_area = 0.0;
        for (index, current) in points.iter().enumerate() {
            let next = points[(index + 1) % points.len()];
            twice_area += current.x() * next.y() - next.x() * current.y();
        }
        twice_area / 2.0
    }

    #[inline]
    pub fn is_finite_polygon(points: &[Point2]) -> bool {
        points.iter().all(|point| point.is_finite())
    }

    /// 与 `f64::clamp` 不同，`min > max` 时不会 panic，而是返回 `min`。
    #[inline]
    pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
        value.min(max).max(min)
    }

    /// 确定性伪随机数，范围 [-1, 1]。相同 key 永远得到相同结果。
    pub fn seeded_noise(key: &str) -> f64 {
        let hash = xxh32(key.as_bytes(), NOISE_SEED);
        (f64::from(hash) / f64::from(u32::MAX)) * 2.0 - 1.0
    }

    /// 角度归一化到 (-180, 180]。
    pub fn normalize_degrees(angle: f64) -> f64 {
        let mut wrapped = angle % 360.0;
        if wrapped <= -180.0 {
            wrapped += 360.0;
        } else if wrapped > 180.0 {
            wrapped -= 360.0;
        }
        wrapped
    }

    /// 欧拉角（度，XYZ 顺序）转四元数。
    pub fn orientation_from_degrees(rotation: DVec3) -> DQuat {
        DQuat::from_euler(
            EulerRot::XYZ,
            rotation.x.to_radians(),
            rotation.y.to_radians(),
            rotation.z.to_radians(),
        )
    }

    pub fn degrees_from_orientation(orientation: DQuat) -> DVec3 {
        let (x, y, z) = orientation.normalize().to_euler(EulerRot::XYZ);
        DVec3::new(
            normalize_degrees(x.to_degrees()),
            normalize_degrees(y.to_degrees()),
            normalize_degrees(z.to_degrees()),
        )
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn signed_area_follows_winding() {
            let ccw = [
                Point2::new(0.0, 0.0),
                Point2::new(4.0, 0.0),
                Point2::new(4.0, 3.0),
                Point2::new(0.0, 3.0),
            ];
            assert!((signed_area(&ccw) - 12.0).abs() < 1e-12);

            let mut cw = ccw;
            cw.reverse();
            assert!((signed_area(&cw) + 12.0).abs() < 1e-12);

            let mut closed = ccw.to_vec();
            closed.push(ccw[0]);
            assert!((signed_area(&closed) - 12.0).abs() < 1e-12);
        }

        #[test]
        fn degenerate_inputs_have_zero_area() {
            assert_eq!(signed_area(&[]), 0.0);
            assert_eq!(
                signed_area(&[Point2::new(0.0, 0.0), Point2::new(1.0, 1.0)]),
                0.0
            );
        }

        #[test]
        fn normalize_degrees_wraps_into_half_open_range() {
            assert_eq!(normalize_degrees(180.0), 180.0);
            assert_eq!(normalize_degrees(-180.0), 180.0);
            assert_eq!(normalize_degrees(190.0), -170.0);
            assert_eq!(normalize_degrees(-190.0), 170.0);
            assert_eq!(normalize_degrees(720.0), 0.0);
            assert_eq!(normalize_degrees(45.0), 45.0);
        }

        #[test]
        fn seeded_noise_is_deterministic_and_bounded() {
            let a = seeded_noise("40.000000,-74.000000,100-way/1-0");
            let b = seeded_noise("40.000000,-74.000000,100-way/1-0");
            let c = seeded_noise("40.000000,-74.000000,100-way/2-1");
            assert_eq!(a.to_bits(), b.to_bits());
            assert_ne!(a.to_bits(), c.to_bits());
            for key in ["", "a", "b", "way/123", "relation/9"] {
                let value = seeded_noise(key);
                assert!((-1.0..=1.0).contains(&value), "{key} -> {value}");
            }
        }

        #[test]
        fn euler_round_trip_preserves_angles() {
            let rotation = DVec3::new(10.0, -35.0, 120.0);
            let back = degrees_from_orientation(orientation_from_degrees(rotation));
            assert!((back - rotation).length() < 1e-9, "{back:?}");
        }

        #[test]
        fn clamp_tolerates_inverted_bounds() {
            assert_eq!(clamp(5.0, 6.0, 80.0), 6.0);
            assert_eq!(clamp(100.0, 6.0, 80.0), 80.0);
            assert_eq!(clamp(30.0, 6.0, 80.0), 30.0);
            assert_eq!(clamp(1.0, 5.0, 2.0), 5.0);
        }
    }
}

pub mod block {
    use std::collections::HashSet;
    use std::fmt;

    use glam::DVec3;
    use serde::{Deserialize, Serialize};
    use thiserror::Error;
    use uuid::Uuid;

    use crate::geometry::normalize_degrees;

    pub const DEFAULT_X_SIZE: f64 = 20.0;
    pub const DEFAULT_Y_SIZE: f64 = 20.0;
    pub const DEFAULT_LEVELS: u32 = 5;
    pub const DEFAULT_LEVEL_HEIGHT: f64 = 3.2;
    /// 新建体块沿 X 轴的排布间距。
    pub const DEFAULT_SPACING: f64 = 25.0;
    /// 复制体块时在 X/Z 方向的偏移量。
    pub const DUPLICATE_OFFSET: f64 = 2.0;

    const LABEL_ALPHABET: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

    /// 体块的稳定标识。新建时使用 UUID v4，从文件读入时保留原值。
    #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct BlockId(String);

    impl BlockId {
        pub fn generate() -> Self {
            Self(Uuid::new_v4().to_string())
        }

        #[inline]
        pub fn new(raw: impl Into<String>) -> Self {
            Self(raw.into())
        }

        #[inline]
        pub fn as_str(&self) -> &str {
            &self.0
        }
    }

    impl fmt::Display for BlockId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    /// 体块功能，固定的封闭集合。
    #[derive(
        Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
    )]
    pub enum Program {
        Retail,
        Office,
        Residential,
        #[default]
        Mixed,
        Others,
    }

    impl Program {
        pub const ALL: [Program; 5] = [
            Program::Retail,
            Program::Office,
            Program::Residential,
            Program::Mixed,
            Program::Others,
        ];

        pub fn as_str(self) -> &'static str {
            match self {
                Program::Retail => "Retail",
                Program::Office => "Office",
                Program::Residential => "Residential",
                Program::Mixed => "Mixed",
                Program::Others => "Others",
            }
        }

        /// 面向用户的名称。
        pub fn label(self) -> &'static str {
            match self {
                Program::Mixed => "Mixed-use",
                other => other.as_str(),
            }
        }

        pub fn parse(value: &str) -> Option<Self> {
            let value = value.trim();
            Self::ALL
                .into_iter()
                .find(|program| program.as_str().eq_ignore_ascii_case(value))
        }
    }

    /// 矩形体块：占地尺寸、层数、层高、位置、旋转与功能。
    ///
    /// 所有长度以米存储；`position.y` 为竖直方向的底面标高；
    /// `rotation` 为 XYZ 顺序欧拉角（度），始终位于 (-180, 180]。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Block {
        pub id: BlockId,
        pub name: String,
        pub x_size: f64,
        pub y_size: f64,
        pub levels: u32,
        pub level_height: f64,
        pub position: DVec3,
        pub rotation: DVec3,
        pub program: Program,
    }

    impl Block {
        /// 以序号生成默认体块：名称按序号编码，沿 X 轴依次排开。
        pub fn with_defaults(index: usize) -> Self {
            Self {
                id: BlockId::generate(),
                name: block_label(index),
                x_size: DEFAULT_X_SIZE,
                y_size: DEFAULT_Y_SIZE,
                levels: DEFAULT_LEVELS,
                level_height: DEFAULT_LEVEL_HEIGHT,
                position: DVec3::new(index as f64 * DEFAULT_SPACING, 0.0, 0.0),
                rotation: DVec3::ZERO,
                program: Program::default(),
            }
        }

        /// 复制除 id 和名称以外的全部字段，并做位置偏移。
        pub fn duplicate(&self, index: usize) -> Self {
            Self {
                id: BlockId::generate(),
                name: block_label(index),
                position: self.position + DVec3::new(DUPLICATE_OFFSET, 0.0, DUPLICATE_OFFSET),
                ..self.clone()
            }
        }

        #[inline]
        pub fn height(&self) -> f64 {
            f64::from(self.levels) * self.level_height
        }

        #[inline]
        pub fn footprint_area(&self) -> f64 {
            self.x_size * self.y_size
        }

        #[inline]
        pub fn gross_floor_area(&self) -> f64 {
            self.footprint_area() * f64::from(self.levels)
        }

        /// 校验整块数据是否满足模型约束（加载外部文件时使用）。
        pub fn validate(&self) -> Result<(), BlockFieldError> {
            if self.id.as_str().trim().is_empty() {
                return Err(BlockFieldError::OutOfRange {
                    field: "id",
                    reason: "must not be empty",
                });
            }
            [
                BlockField::XSize(self.x_size),
                BlockField::YSize(self.y_size),
                BlockField::Levels(self.levels),
                BlockField::LevelHeight(self.level_height),
                BlockField::Position(self.position),
                BlockField::Rotation(self.rotation),
            ]
            .iter()
            .try_for_each(BlockField::validate)
        }
    }

    /// 序号转名称：0 -> `Block A`，25 -> `Block Z`，26 -> `Block AA`。
    pub fn block_label(index: usize) -> String {
        let mut letters = Vec::new();
        let mut current = index;
        loop {
            letters.push(LABEL_ALPHABET[current % LABEL_ALPHABET.len()] as char);
            if current < LABEL_ALPHABET.len() {
                break;
            }
            current = current / LABEL_ALPHABET.len() - 1;
        }
        let label: String = letters.into_iter().rev().collect();
        format!("Block {label}")
    }

    /// 若名称已被占用，追加 ` (2)`、` (3)` … 直到唯一。
    pub fn unique_name<'a>(desired: &str, existing: impl IntoIterator<Item = &'a str>) -> String {
        let taken: HashSet<&str> = existing.into_iter().collect();
        if !taken.contains(desired) {
            return desired.to_string();
        }
        (2..)
            .map(|suffix| format!("{desired} ({suffix})"))
            .find(|candidate| !taken.contains(candidate.as_str()))
            .unwrap_or_else(|| desired.to_string())
    }

    /// 可编辑字段。名称与 id 不在其中：名称只能通过重命名修改。
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub enum BlockField {
        XSize(f64),
        YSize(f64),
        Levels(u32),
        LevelHeight(f64),
        PosX(f64),
        PosY(f64),
        PosZ(f64),
        Position(DVec3),
        RotationX(f64),
        RotationY(f64),
        RotationZ(f64),
        Rotation(DVec3),
        Program(Program),
    }

    impl BlockField {
        /// 将文本输入映射为字段，字段名沿用会话文件中的 camelCase 命名。
        pub fn parse(name: &str, value: &str) -> Result<Self, BlockFieldError> {
            let number = |field: &str| -> Result<f64, BlockFieldError> {
                value
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| BlockFieldError::InvalidValue {
                        field: field.to_string(),
                        value: value.to_string(),
                    })
            };
            let field = match name {
                "xSize" => BlockField::XSize(number(name)?),
                "ySize" => BlockField::YSize(number(name)?),
                "levels" => BlockField::Levels(value.trim().parse::<u32>().map_err(|_| {
                    BlockFieldError::InvalidValue {
                        field: name.to_string(),
                        value: value.to_string(),
                    }
                })?),
                "levelHeight" => BlockField::LevelHeight(number(name)?),
                "posX" => BlockField::PosX(number(name)?),
                "posY" => BlockField::PosY(number(name)?),
                "posZ" => BlockField::PosZ(number(name)?),
                "rotationX" => BlockField::RotationX(number(name)?),
                "rotationY" => BlockField::RotationY(number(name)?),
                "rotationZ" => BlockField::RotationZ(number(name)?),
                "defaultFunction" => BlockField::Program(Program::parse(value).ok_or_else(
                    || BlockFieldError::InvalidValue {
                        field: name.to_string(),
                        value: value.to_string(),
                    },
                )?),
                other => return Err(BlockFieldError::UnknownField(other.to_string())),
            };
            field.validate()?;
            Ok(field)
        }

        pub fn name(&self) -> &'static str {
            match self {
                BlockField::XSize(_) => "xSize",
                BlockField::YSize(_) => "ySize",
                BlockField::Levels(_) => "levels",
                BlockField::LevelHeight(_) => "levelHeight",
                BlockField::PosX(_) => "posX",
                BlockField::PosY(_) => "posY",
                BlockField::PosZ(_) => "posZ",
                BlockField::Position(_) => "position",
                BlockField::RotationX(_) => "rotationX",
                BlockField::RotationY(_) => "rotationY",
                BlockField::RotationZ(_) => "rotationZ",
                BlockField::Rotation(_) => "rotation",
                BlockField::Program(_) => "defaultFunction",
            }
        }

        pub fn validate(&self) -> Result<(), BlockFieldError> {
            let field = self.name();
            let positive = |value: f64| {
                if value.is_finite() && value > 0.0 {
                    Ok(())
                } else {
                    Err(BlockFieldError::OutOfRange {
                        field,
                        reason: "must be a finite value greater than zero",
                    })
                }
            };
            let finite = |value: f64| {
                if value.is_finite() {
                    Ok(())
                } else {
                    Err(BlockFieldError::OutOfRange {
                        field,
                        reason: "must be finite",
                    })
                }
            };
            match *self {
                BlockField::XSize(value)
                | BlockField::YSize(value)
                | BlockField::LevelHeight(value) => positive(value),
                BlockField::Levels(levels) => {
                    if levels >= 1 {
                        Ok(())
                    } else {
                        Err(BlockFieldError::OutOfRange {
                            field,
                            reason: "must be at least 1",
                        })
                    }
                }
                BlockField::PosX(value)
                | BlockField::PosY(value)
                | BlockField::PosZ(value)
                | BlockField::RotationX(value)
                | BlockField::RotationY(value)
                | BlockField::RotationZ(value) => finite(value),
                BlockField::Position(vec) | BlockField::Rotation(vec) => {
                    if vec.is_finite() {
                        Ok(())
                    } else {
                        Err(BlockFieldError::OutOfRange {
                            field,
                            reason: "must be finite",
                        })
                    }
                }
                BlockField::Program(_) => Ok(()),
            }
        }

        fn apply(&self, block: &mut Block) {
            match *self {
                BlockField::XSize(value) => block.x_size = value,
                BlockField::YSize(value) => block.y_size = value,
                BlockField::Levels(value) => block.levels = value,
                BlockField::LevelHeight(value) => block.level_height = value,
                BlockField::PosX(value) => block.position.x = value,
                BlockField::PosY(value) => block.position.y = value,
                BlockField::PosZ(value) => block.position.z = value,
                BlockField::Position(value) => block.position = value,
                BlockField::RotationX(value) => block.rotation.x = normalize_degrees(value),
                BlockField::RotationY(value) => block.rotation.y = normalize_degrees(value),
                BlockField::RotationZ(value) => block.rotation.z = normalize_degrees(value),
                BlockField::Rotation(value) => {
                    block.rotation = DVec3::new(
                        normalize_degrees(value.x),
                        normalize_degrees(value.y),
                        normalize_degrees(value.z),
                    )
                }
                BlockField::Program(program) => block.program = program,
            }
        }
    }

    /// 一次局部更新：按顺序列出要修改的字段，合并前整体校验。
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct BlockUpdate {
        fields: Vec<BlockField>,
    }

    impl BlockUpdate {
        #[inline]
        pub fn new() -> Self {
            Self::default()
        }

        #[inline]
        pub fn with(mut self, field: BlockField) -> Self {
            self.fields.push(field);
            self
        }

        #[inline]
        pub fn push(&mut self, field: BlockField) {
            self.fields.push(field);
        }

        #[inline]
        pub fn fields(&self) -> &[BlockField] {
            &self.fields
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.fields.is_empty()
        }

        pub fn validate(&self) -> Result<(), BlockFieldError> {
            self.fields.iter().try_for_each(BlockField::validate)
        }

        /// 按顺序合并字段。调用方应先 `validate`。
        pub fn apply_to(&self, block: &mut Block) {
            for field in &self.fields {
                field.apply(block);
            }
        }
    }

    impl From<BlockField> for BlockUpdate {
        fn from(field: BlockField) -> Self {
            Self {
                fields: vec![field],
            }
        }
    }

    impl FromIterator<BlockField> for BlockUpdate {
        fn from_iter<T: IntoIterator<Item = BlockField>>(iter: T) -> Self {
            Self {
                fields: iter.into_iter().collect(),
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum BlockFieldError {
        #[error("unknown block field `{0}`")]
        UnknownField(String),
        #[error("invalid value `{value}` for field `{field}`")]
        InvalidValue { field: String, value: String },
        #[error("field `{field}` is out of range: {reason}")]
        OutOfRange {
            field: &'static str,
            reason: &'static str,
        },
    }

}

pub mod session {
    use serde::{Deserialize, Serialize};

    use crate::block::{Block, BlockId};
    use crate::units::UnitSystem;

    /// 会话模型：单位制与有序体块列表。历史记录保存的就是它的完整副本。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct SessionModel {
        pub units: UnitSystem,
        pub blocks: Vec<Block>,
    }

    impl SessionModel {
        #[inline]
        pub fn new(units: UnitSystem, blocks: Vec<Block>) -> Self {
            Self { units, blocks }
        }

        pub fn with_default_block() -> Self {
            Self::new(UnitSystem::default(), vec![Block::with_defaults(0)])
        }

        /// 会话至少要有一个体块；为空时补一个默认体块。
        pub fn ensure_not_empty(&mut self) -> bool {
            if self.blocks.is_empty() {
                self.blocks.push(Block::with_defaults(0));
                true
            } else {
                false
            }
        }

        #[inline]
        pub fn block(&self, id: &BlockId) -> Option<&Block> {
            self.blocks.iter().find(|block| &block.id == id)
        }

        #[inline]
        pub fn block_mut(&mut self, id: &BlockId) -> Option<&mut Block> {
            self.blocks.iter_mut().find(|block| &block.id == id)
        }

        #[inline]
        pub fn position_of(&self, id: &BlockId) -> Option<usize> {
            self.blocks.iter().position(|block| &block.id == id)
        }

        #[inline]
        pub fn contains(&self, id: &BlockId) -> bool {
            self.position_of(id).is_some()
        }
    }
}

pub mod context {
    use serde::{Deserialize, Serialize};

    pub const CONTEXT_SCHEMA_VERSION: u32 = 1;
    /// 单次渲染的周边建筑上限。
    pub const MAX_CONTEXT_BUILDINGS: usize = 400;

    /// WGS84 经纬度（度）。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct GeoPoint {
        pub lat: f64,
        pub lon: f64,
    }

    impl GeoPoint {
        #[inline]
        pub fn new(lat: f64, lon: f64) -> Self {
            Self { lat, lon }
        }

        #[inline]
        pub fn is_valid(self) -> bool {
            self.lat.is_finite()
                && self.lon.is_finite()
                && self.lat.abs() <= 90.0
                && self.lon.abs() <= 180.0
        }

        /// 查询键：`lat,lon,radius`，经纬度保留 6 位小数。
        pub fn fetch_key(self, radius_m: f64) -> String {
            format!("{:.6},{:.6},{}", self.lat, self.lon, radius_m)
        }
    }

    /// 外部来源的建筑轮廓，`footprint` 中每个点为 `[lat, lon]`。属于不可信输入。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct BuildingFootprint {
        pub id: String,
        pub footprint: Vec<[f64; 2]>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub height_m: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub levels: Option<u32>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ContextSnapshot {
        pub center: GeoPoint,
        pub radius_m: f64,
        pub buildings: Vec<BuildingFootprint>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub fetched_at: Option<String>,
        pub source: String,
    }

}

pub mod metrics {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Serialize};

    use crate::block::Program;
    use crate::session::SessionModel;
    use crate::units::UnitSystem;

    /// 从体块列表派生的只读指标，面积单位为平方米。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Metrics {
        pub total_gfa: f64,
        pub total_levels: u32,
        pub max_height: f64,
        pub gfa_by_program: BTreeMap<Program, f64>,
        pub units: UnitSystem,
    }

    impl Metrics {
        /// 某功能占总建筑面积的比例。
        pub fn program_share(&self, program: Program) -> f64 {
            if self.total_gfa <= 0.0 {
                return 0.0;
            }
            self.gfa_by_program.get(&program).copied().unwrap_or(0.0) / self.total_gfa
        }
    }

    pub fn compute_metrics(model: &SessionModel) -> Metrics {
        let mut gfa_by_program: BTreeMap<Program, f64> =
            Program::ALL.into_iter().map(|program| (program, 0.0)).collect();
        let mut total_gfa = 0.0;
        let mut total_levels = 0u32;
        let mut max_height = 0.0f64;

        for block in &model.blocks {
            let gfa = block.gross_floor_area();
            *gfa_by_program.entry(block.program).or_insert(0.0) += gfa;
            total_gfa += gfa;
            total_levels = total_levels.saturating_add(block.levels);
            max_height = max_height.max(block.position.y + block.height());
        }

        Metrics {
            total_gfa,
            total_levels,
            max_height,
            gfa_by_program,
            units: model.units,
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::block::Block;

        #[test]
        fn totals_are_grouped_by_program() {
            let mut office = Block::with_defaults(0);
            office.program = Program::Office;
            office.x_size = 10.0;
            office.y_size = 10.0;
            office.levels = 3;

            let mut housing = Block::with_defaults(1);
            housing.program = Program::Residential;
            housing.x_size = 20.0;
            housing.y_size = 5.0;
            housing.levels = 10;
            housing.level_height = 3.0;
            housing.position.y = 4.0;

            let model = SessionModel::new(UnitSystem::Imperial, vec![office, housing]);
            let metrics = compute_metrics(&model);

            assert_eq!(metrics.total_gfa, 1_300.0);
            assert_eq!(metrics.total_levels, 13);
            assert_eq!(metrics.max_height, 34.0);
            assert_eq!(metrics.gfa_by_program[&Program::Office], 300.0);
            assert_eq!(metrics.gfa_by_program[&Program::Residential], 1_000.0);
            assert_eq!(metrics.gfa_by_program[&Program::Retail], 0.0);
            assert_eq!(metrics.gfa_by_program.len(), 5);
            assert_eq!(metrics.units, UnitSystem::Imperial);
            assert!((metrics.program_share(Program::Office) - 300.0 / 1_300.0).abs() < 1e-12);
        }

        #[test]
        fn metrics_serialize_program_keys_as_strings() {
            let metrics = compute_metrics(&SessionModel::with_default_block());
            let json = serde_json::to_value(&metrics).unwrap();
            assert_eq!(json["gfaByProgram"]["Mixed"], 2_000.0);
            assert_eq!(json["totalLevels"], 5);
        }
    }
}
