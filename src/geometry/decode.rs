//! Binary geometry reader.
//!
//! Accepts PostGIS EWKB (SRID/Z/M high-bit flags), ISO WKB (Z/M encoded as
//! +1000/+2000/+3000 type offsets) and GeoPackage blobs, including the SQL/MM
//! curve types, which linear-only WKB readers cannot represent.

use crate::error::{FeatureError, Result};

use super::Coord;

const EWKB_Z: u32 = 0x8000_0000;
const EWKB_M: u32 = 0x4000_0000;
const EWKB_SRID: u32 = 0x2000_0000;
const EWKB_FLAGS: u32 = EWKB_Z | EWKB_M | EWKB_SRID;

/// Deepest accepted nesting of collections and curve members.
pub(crate) const MAX_NESTING_DEPTH: usize = 64;

// cf. OGC 06-103r4, table 7
pub(crate) const WKB_POINT: u32 = 1;
pub(crate) const WKB_LINESTRING: u32 = 2;
pub(crate) const WKB_POLYGON: u32 = 3;
pub(crate) const WKB_MULTIPOINT: u32 = 4;
pub(crate) const WKB_MULTILINESTRING: u32 = 5;
pub(crate) const WKB_MULTIPOLYGON: u32 = 6;
pub(crate) const WKB_GEOMETRYCOLLECTION: u32 = 7;
pub(crate) const WKB_CIRCULARSTRING: u32 = 8;
pub(crate) const WKB_COMPOUNDCURVE: u32 = 9;
pub(crate) const WKB_CURVEPOLYGON: u32 = 10;
pub(crate) const WKB_MULTICURVE: u32 = 11;
pub(crate) const WKB_MULTISURFACE: u32 = 12;

/// A decoded geometry that may still contain circular arcs.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum RawGeometry {
    Point(Option<Coord>),
    LineString(Vec<Coord>),
    CircularString(Vec<Coord>),
    CompoundCurve(Vec<RawGeometry>),
    Polygon(Vec<Vec<Coord>>),
    CurvePolygon(Vec<RawGeometry>),
    MultiPoint(Vec<RawGeometry>),
    MultiLineString(Vec<RawGeometry>),
    MultiCurve(Vec<RawGeometry>),
    MultiPolygon(Vec<RawGeometry>),
    MultiSurface(Vec<RawGeometry>),
    GeometryCollection(Vec<RawGeometry>),
}

impl RawGeometry {
    fn type_code(&self) -> u32 {
        match self {
            RawGeometry::Point(_) => WKB_POINT,
            RawGeometry::LineString(_) => WKB_LINESTRING,
            RawGeometry::Polygon(_) => WKB_POLYGON,
            RawGeometry::MultiPoint(_) => WKB_MULTIPOINT,
            RawGeometry::MultiLineString(_) => WKB_MULTILINESTRING,
            RawGeometry::MultiPolygon(_) => WKB_MULTIPOLYGON,
            RawGeometry::GeometryCollection(_) => WKB_GEOMETRYCOLLECTION,
            RawGeometry::CircularString(_) => WKB_CIRCULARSTRING,
            RawGeometry::CompoundCurve(_) => WKB_COMPOUNDCURVE,
            RawGeometry::CurvePolygon(_) => WKB_CURVEPOLYGON,
            RawGeometry::MultiCurve(_) => WKB_MULTICURVE,
            RawGeometry::MultiSurface(_) => WKB_MULTISURFACE,
        }
    }

    /// Whether any part of the geometry is a circular arc.
    pub(crate) fn has_curves(&self) -> bool {
        match self {
            RawGeometry::Point(_)
            | RawGeometry::LineString(_)
            | RawGeometry::Polygon(_) => false,
            RawGeometry::CircularString(_) => true,
            RawGeometry::CompoundCurve(parts)
            | RawGeometry::CurvePolygon(parts)
            | RawGeometry::MultiPoint(parts)
            | RawGeometry::MultiLineString(parts)
            | RawGeometry::MultiCurve(parts)
            | RawGeometry::MultiPolygon(parts)
            | RawGeometry::MultiSurface(parts)
            | RawGeometry::GeometryCollection(parts) => parts.iter().any(RawGeometry::has_curves),
        }
    }
}

/// A decoded geometry together with the SRID embedded in the blob, if any.
#[derive(Debug)]
pub(crate) struct Decoded {
    pub geometry: RawGeometry,
    pub srid: Option<u32>,
}

/// Decode an EWKB, ISO WKB or GeoPackage geometry blob.
pub(crate) fn decode(blob: &[u8]) -> Result<Decoded> {
    if blob.starts_with(b"GP") {
        let (srid, wkb) = strip_gpkg_header(blob)?;
        let mut reader = WkbReader::new(wkb);
        let (geometry, embedded) = reader.read_geometry()?;
        return Ok(Decoded {
            geometry,
            srid: embedded.or(srid),
        });
    }

    let mut reader = WkbReader::new(blob);
    let (geometry, srid) = reader.read_geometry()?;
    Ok(Decoded { geometry, srid })
}

/// Strip GeoPackage header and envelope bytes to access raw WKB.
// cf. https://www.geopackage.org/spec140/index.html#gpb_format
fn strip_gpkg_header(b: &[u8]) -> Result<(Option<u32>, &[u8])> {
    if b.len() < 8 {
        return Err(FeatureError::InvalidGeometry(format!(
            "gpkg geometry blob too short: got {} bytes, expected at least 8",
            b.len()
        )));
    }
    let flags = b[3];
    let envelope_size: usize = match flags & 0b00001110 {
        0b00000000 => 0,  // no envelope
        0b00000010 => 32, // envelope is [minx, maxx, miny, maxy], 32 bytes
        0b00000100 => 48, // envelope is [minx, maxx, miny, maxy, minz, maxz], 48 bytes
        0b00000110 => 48, // envelope is [minx, maxx, miny, maxy, minm, maxm], 48 bytes
        0b00001000 => 64, // envelope is [minx, maxx, miny, maxy, minz, maxz, minm, maxm], 64 bytes
        _ => {
            return Err(FeatureError::InvalidGeometry(format!(
                "invalid gpkg geometry flags: {flags:#04x}"
            )));
        }
    };
    let srs_bytes = [b[4], b[5], b[6], b[7]];
    let srs_id = if flags & 0b00000001 == 1 {
        i32::from_le_bytes(srs_bytes)
    } else {
        i32::from_be_bytes(srs_bytes)
    };
    let offset = 8 + envelope_size;
    if b.len() < offset {
        return Err(FeatureError::InvalidGeometry(format!(
            "gpkg geometry envelope truncated: got {} bytes, required {offset}",
            b.len()
        )));
    }

    // srs_id 0 and -1 are the "undefined" systems of the GeoPackage spec.
    let srid = u32::try_from(srs_id).ok().filter(|id| *id > 0);
    Ok((srid, &b[offset..]))
}

#[derive(Clone, Copy)]
struct Header {
    little_endian: bool,
    code: u32,
    has_z: bool,
    has_m: bool,
}

impl Header {
    fn ordinates(&self) -> usize {
        2 + usize::from(self.has_z) + usize::from(self.has_m)
    }
}

struct WkbReader<'a> {
    buf: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> WkbReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            depth: 0,
        }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        if self.remaining() < N {
            return Err(FeatureError::InvalidGeometry(format!(
                "unexpected end of geometry at byte {}",
                self.pos
            )));
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    fn read_u32(&mut self, little_endian: bool) -> Result<u32> {
        let bytes = self.take::<4>()?;
        Ok(if little_endian {
            u32::from_le_bytes(bytes)
        } else {
            u32::from_be_bytes(bytes)
        })
    }

    fn read_f64(&mut self, little_endian: bool) -> Result<f64> {
        let bytes = self.take::<8>()?;
        Ok(if little_endian {
            f64::from_le_bytes(bytes)
        } else {
            f64::from_be_bytes(bytes)
        })
    }

    /// Read an element count and make sure the buffer can hold that many
    /// elements of at least `min_size` bytes each.
    fn read_count(&mut self, little_endian: bool, min_size: usize) -> Result<usize> {
        let count = self.read_u32(little_endian)? as usize;
        if count.saturating_mul(min_size) > self.remaining() {
            return Err(FeatureError::InvalidGeometry(format!(
                "element count {count} exceeds remaining {} bytes",
                self.remaining()
            )));
        }
        Ok(count)
    }

    fn read_header(&mut self) -> Result<(Header, Option<u32>)> {
        let [order] = self.take::<1>()?;
        let little_endian = match order {
            0 => false,
            1 => true,
            other => {
                return Err(FeatureError::InvalidGeometry(format!(
                    "invalid byte order marker: {other}"
                )));
            }
        };
        let raw = self.read_u32(little_endian)?;
        let srid = if raw & EWKB_SRID != 0 {
            Some(self.read_u32(little_endian)?)
        } else {
            None
        };

        let mut has_z = raw & EWKB_Z != 0;
        let mut has_m = raw & EWKB_M != 0;
        let mut code = raw & !EWKB_FLAGS;
        match code / 1000 {
            0 => {}
            1 => has_z = true,
            2 => has_m = true,
            3 => {
                has_z = true;
                has_m = true;
            }
            _ => return Err(FeatureError::UnsupportedGeometryType(raw)),
        }
        code %= 1000;

        Ok((
            Header {
                little_endian,
                code,
                has_z,
                has_m,
            },
            srid,
        ))
    }

    fn read_geometry(&mut self) -> Result<(RawGeometry, Option<u32>)> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(FeatureError::InvalidGeometry(format!(
                "geometry nested deeper than {MAX_NESTING_DEPTH} levels at byte {}",
                self.pos
            )));
        }
        self.depth += 1;
        let result = self.read_header().and_then(|(header, srid)| {
            let geometry = self.read_body(header)?;
            Ok((geometry, srid))
        });
        self.depth -= 1;
        result
    }

    fn read_member(&mut self, allowed: &[u32]) -> Result<RawGeometry> {
        let (member, _) = self.read_geometry()?;
        if !allowed.contains(&member.type_code()) {
            return Err(FeatureError::InvalidGeometry(format!(
                "unexpected member geometry type {}",
                member.type_code()
            )));
        }
        Ok(member)
    }

    fn read_members(&mut self, header: Header, allowed: &[u32]) -> Result<Vec<RawGeometry>> {
        // A nested geometry takes at least its byte order and type code.
        let count = self.read_count(header.little_endian, 5)?;
        let mut members = Vec::with_capacity(count);
        for _ in 0..count {
            members.push(self.read_member(allowed)?);
        }
        Ok(members)
    }

    fn read_coord(&mut self, header: Header) -> Result<Coord> {
        let le = header.little_endian;
        let x = self.read_f64(le)?;
        let y = self.read_f64(le)?;
        let z = if header.has_z {
            Some(self.read_f64(le)?)
        } else {
            None
        };
        if header.has_m {
            // GeoJSON has no place for measures.
            self.read_f64(le)?;
        }
        Ok(Coord { x, y, z })
    }

    fn read_coords(&mut self, header: Header) -> Result<Vec<Coord>> {
        let count = self.read_count(header.little_endian, header.ordinates() * 8)?;
        let mut coords = Vec::with_capacity(count);
        for _ in 0..count {
            coords.push(self.read_coord(header)?);
        }
        Ok(coords)
    }

    fn read_body(&mut self, header: Header) -> Result<RawGeometry> {
        let geometry = match header.code {
            WKB_POINT => {
                let coord = self.read_coord(header)?;
                // Empty points are encoded with NaN ordinates.
                if coord.x.is_nan() && coord.y.is_nan() {
                    RawGeometry::Point(None)
                } else {
                    RawGeometry::Point(Some(coord))
                }
            }
            WKB_LINESTRING => RawGeometry::LineString(self.read_coords(header)?),
            WKB_CIRCULARSTRING => RawGeometry::CircularString(self.read_coords(header)?),
            WKB_POLYGON => {
                let count = self.read_count(header.little_endian, 4)?;
                let mut rings = Vec::with_capacity(count);
                for _ in 0..count {
                    rings.push(self.read_coords(header)?);
                }
                RawGeometry::Polygon(rings)
            }
            WKB_COMPOUNDCURVE => RawGeometry::CompoundCurve(
                self.read_members(header, &[WKB_LINESTRING, WKB_CIRCULARSTRING])?,
            ),
            WKB_CURVEPOLYGON => RawGeometry::CurvePolygon(self.read_members(
                header,
                &[WKB_LINESTRING, WKB_CIRCULARSTRING, WKB_COMPOUNDCURVE],
            )?),
            WKB_MULTIPOINT => RawGeometry::MultiPoint(self.read_members(header, &[WKB_POINT])?),
            WKB_MULTILINESTRING => {
                RawGeometry::MultiLineString(self.read_members(header, &[WKB_LINESTRING])?)
            }
            WKB_MULTICURVE => RawGeometry::MultiCurve(self.read_members(
                header,
                &[WKB_LINESTRING, WKB_CIRCULARSTRING, WKB_COMPOUNDCURVE],
            )?),
            WKB_MULTIPOLYGON => {
                RawGeometry::MultiPolygon(self.read_members(header, &[WKB_POLYGON])?)
            }
            WKB_MULTISURFACE => RawGeometry::MultiSurface(
                self.read_members(header, &[WKB_POLYGON, WKB_CURVEPOLYGON])?,
            ),
            WKB_GEOMETRYCOLLECTION => {
                let count = self.read_count(header.little_endian, 5)?;
                let mut members = Vec::with_capacity(count);
                for _ in 0..count {
                    members.push(self.read_geometry()?.0);
                }
                RawGeometry::GeometryCollection(members)
            }
            other => return Err(FeatureError::UnsupportedGeometryType(other)),
        };
        Ok(geometry)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{MAX_NESTING_DEPTH, RawGeometry, decode};
    use crate::Result;
    use crate::error::FeatureError;
    use crate::geometry::Coord;
    use geo_traits::GeometryTrait;
    use geo_types::{LineString, MultiPoint, Point, Polygon};
    use std::str::FromStr;
    use wkt::Wkt;

    pub(crate) fn wkb_from_geometry<G: GeometryTrait<T = f64>>(geometry: G) -> Vec<u8> {
        let mut buf = Vec::new();
        wkb::writer::write_geometry(&mut buf, &geometry, &Default::default())
            .expect("write wkb");
        buf
    }

    /// Little-endian EWKB point with an embedded SRID.
    pub(crate) fn ewkb_point(srid: u32, x: f64, y: f64) -> Vec<u8> {
        let mut buf = vec![0x01];
        buf.extend_from_slice(&(1u32 | 0x2000_0000).to_le_bytes());
        buf.extend_from_slice(&srid.to_le_bytes());
        buf.extend_from_slice(&x.to_le_bytes());
        buf.extend_from_slice(&y.to_le_bytes());
        buf
    }

    /// Little-endian ISO WKB circular string.
    pub(crate) fn wkb_circular_string(coords: &[(f64, f64)]) -> Vec<u8> {
        let mut buf = vec![0x01];
        buf.extend_from_slice(&8u32.to_le_bytes());
        buf.extend_from_slice(&(coords.len() as u32).to_le_bytes());
        for (x, y) in coords {
            buf.extend_from_slice(&x.to_le_bytes());
            buf.extend_from_slice(&y.to_le_bytes());
        }
        buf
    }

    fn xy(x: f64, y: f64) -> Coord {
        Coord { x, y, z: None }
    }

    #[test]
    fn decodes_ewkb_point_with_srid() -> Result<()> {
        let decoded = decode(&ewkb_point(4326, 1.0, 2.0))?;
        assert_eq!(decoded.srid, Some(4326));
        assert_eq!(decoded.geometry, RawGeometry::Point(Some(xy(1.0, 2.0))));
        Ok(())
    }

    #[test]
    fn decodes_big_endian_ewkb_with_z_flag() -> Result<()> {
        let mut buf = vec![0x00];
        buf.extend_from_slice(&(1u32 | 0x8000_0000).to_be_bytes());
        for v in [3.0f64, 4.0, 5.0] {
            buf.extend_from_slice(&v.to_be_bytes());
        }
        let decoded = decode(&buf)?;
        assert_eq!(
            decoded.geometry,
            RawGeometry::Point(Some(Coord {
                x: 3.0,
                y: 4.0,
                z: Some(5.0)
            }))
        );
        assert_eq!(decoded.srid, None);
        Ok(())
    }

    #[test]
    fn decodes_iso_wkb_written_by_wkb_crate() -> Result<()> {
        let polygon = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 0.0)]),
            vec![],
        );
        let decoded = decode(&wkb_from_geometry(polygon))?;
        match decoded.geometry {
            RawGeometry::Polygon(rings) => {
                assert_eq!(rings.len(), 1);
                assert_eq!(rings[0].len(), 4);
                assert_eq!(rings[0][1], xy(2.0, 0.0));
            }
            other => panic!("unexpected geometry: {other:?}"),
        }

        let multi = MultiPoint::from(vec![Point::new(1.0, 1.0), Point::new(2.0, 3.0)]);
        let decoded = decode(&wkb_from_geometry(multi))?;
        assert!(matches!(decoded.geometry, RawGeometry::MultiPoint(ref points) if points.len() == 2));
        Ok(())
    }

    #[test]
    fn decodes_iso_z_and_m_offsets() -> Result<()> {
        let line_zm = Wkt::from_str("LINESTRING ZM (0 0 1 10, 2 0 2 11)")
            .map_err(|err| FeatureError::InvalidGeometry(err.to_string()))?;
        let decoded = decode(&wkb_from_geometry(line_zm))?;
        assert_eq!(
            decoded.geometry,
            RawGeometry::LineString(vec![
                Coord {
                    x: 0.0,
                    y: 0.0,
                    z: Some(1.0)
                },
                Coord {
                    x: 2.0,
                    y: 0.0,
                    z: Some(2.0)
                },
            ])
        );
        Ok(())
    }

    #[test]
    fn decodes_curves() -> Result<()> {
        let decoded = decode(&wkb_circular_string(&[(0.0, 0.0), (1.0, 1.0), (2.0, 0.0)]))?;
        assert!(decoded.geometry.has_curves());
        Ok(())
    }

    #[test]
    fn strips_gpkg_header_and_reads_srs_id() -> Result<()> {
        let mut blob = vec![0x47, 0x50, 0x00, 0b0000_0011];
        blob.extend_from_slice(&3857i32.to_le_bytes());
        blob.extend_from_slice(&[0u8; 32]);
        blob.extend_from_slice(&wkb_from_geometry(Point::new(5.0, 6.0)));

        let decoded = decode(&blob)?;
        assert_eq!(decoded.srid, Some(3857));
        assert_eq!(decoded.geometry, RawGeometry::Point(Some(xy(5.0, 6.0))));
        Ok(())
    }

    #[test]
    fn rejects_truncated_and_unknown_input() {
        let mut blob = ewkb_point(4326, 1.0, 2.0);
        blob.truncate(blob.len() - 3);
        assert!(matches!(decode(&blob), Err(FeatureError::InvalidGeometry(_))));

        let mut tin = vec![0x01];
        tin.extend_from_slice(&16u32.to_le_bytes());
        tin.extend_from_slice(&0u32.to_le_bytes());
        assert!(matches!(
            decode(&tin),
            Err(FeatureError::UnsupportedGeometryType(16))
        ));

        let bogus_count = {
            let mut buf = vec![0x01];
            buf.extend_from_slice(&2u32.to_le_bytes());
            buf.extend_from_slice(&u32::MAX.to_le_bytes());
            buf
        };
        assert!(matches!(
            decode(&bogus_count),
            Err(FeatureError::InvalidGeometry(_))
        ));
    }

    /// `depth` little-endian geometry collections, each wrapping the next,
    /// around a single point.
    fn nested_collections(depth: usize) -> Vec<u8> {
        let mut buf = Vec::new();
        for _ in 0..depth {
            buf.push(0x01);
            buf.extend_from_slice(&7u32.to_le_bytes());
            buf.extend_from_slice(&1u32.to_le_bytes());
        }
        buf.extend_from_slice(&ewkb_point(4326, 1.0, 2.0));
        buf
    }

    #[test]
    fn limits_nesting_depth() -> Result<()> {
        let decoded = decode(&nested_collections(MAX_NESTING_DEPTH - 1))?;
        assert!(matches!(decoded.geometry, RawGeometry::GeometryCollection(_)));

        assert!(matches!(
            decode(&nested_collections(MAX_NESTING_DEPTH)),
            Err(FeatureError::InvalidGeometry(_))
        ));
        // Far beyond the limit the reader still fails instead of exhausting the stack.
        assert!(matches!(
            decode(&nested_collections(200_000)),
            Err(FeatureError::InvalidGeometry(_))
        ));
        Ok(())
    }
}
