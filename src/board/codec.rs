//! Position and match identifier codec
//!
//! The engine addresses a position by a base64 pair `positionId:matchId`.
//! The position ID is an 80-bit little-endian bitstream: for the side to
//! move, then the opponent, each of points 1..=24 followed by the bar is
//! written as a unary run of `1` bits terminated by a `0`. The match ID is a
//! 66-bit field list (cube, roller, dice, length, scores) padded to 72 bits.
//!
//! Decode order matters: the roller bit lives in the match ID, and the
//! position bytes list the roller's side first, so the match ID must be read
//! before the position checkers can be assigned to sides.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine as _;

use crate::error::{Error, Result};

use super::{Board, Dice, Player, BAR, CHECKERS};

const POSITION_BYTES: usize = 10;
const POSITION_BITS: usize = 80;
const MATCH_BYTES: usize = 9;

/// LSB-first bit writer over a fixed byte buffer
struct BitWriter {
    buf: Vec<u8>,
    cursor: usize,
}

impl BitWriter {
    fn new(len: usize) -> Self {
        Self {
            buf: vec![0u8; len],
            cursor: 0,
        }
    }

    fn push_bit(&mut self, bit: bool) {
        if bit {
            self.buf[self.cursor / 8] |= 1u8 << (self.cursor % 8);
        }
        self.cursor += 1;
    }

    /// Write `width` bits of `value`, least-significant bit first
    fn push_bits(&mut self, value: u32, width: usize) {
        for i in 0..width {
            self.push_bit((value >> i) & 1 == 1);
        }
    }
}

/// LSB-first bit reader over a byte buffer
struct BitReader<'a> {
    buf: &'a [u8],
    cursor: usize,
}

impl<'a> BitReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, cursor: 0 }
    }

    fn read_bit(&mut self) -> Result<bool> {
        if self.cursor >= self.buf.len() * 8 {
            return Err(Error::InvalidId("bitstream exhausted".to_string()));
        }
        let bit = (self.buf[self.cursor / 8] >> (self.cursor % 8)) & 1 == 1;
        self.cursor += 1;
        Ok(bit)
    }

    fn read_bits(&mut self, width: usize) -> Result<u32> {
        let mut value = 0u32;
        for i in 0..width {
            if self.read_bit()? {
                value |= 1 << i;
            }
        }
        Ok(value)
    }
}

/// Encode the board occupancy into the 14-character position ID.
pub fn encode_position(board: &Board) -> String {
    let mut writer = BitWriter::new(POSITION_BYTES);
    for player in [board.turn, board.turn.opponent()] {
        let side = &board.points[player.index()];
        for slot in (1..=24).chain([BAR]) {
            for _ in 0..side[slot] {
                writer.push_bit(true);
            }
            writer.push_bit(false);
        }
    }
    STANDARD_NO_PAD.encode(writer.buf)
}

/// Encode the match context into the 12-character match ID.
pub fn encode_match(board: &Board) -> String {
    let mut writer = BitWriter::new(MATCH_BYTES);

    let cube_exponent = board.cube_value.max(1).trailing_zeros().min(15);
    writer.push_bits(cube_exponent, 4);

    let owner_bits = match board.cube_owner {
        Some(Player::One) => 0b00,
        Some(Player::Two) => 0b01,
        None => 0b11,
    };
    writer.push_bits(owner_bits, 2);

    let roller = board.turn == Player::Two;
    writer.push_bit(roller);
    // Crawford flag
    writer.push_bit(false);
    // Game state: in progress
    writer.push_bits(0b001, 3);
    // Decision owner follows the roller
    writer.push_bit(roller);
    // Double offered
    writer.push_bit(false);
    // Resignation
    writer.push_bits(0, 2);

    let (die1, die2) = match board.dice {
        Some(d) => (d.die1 as u32, d.die2 as u32),
        None => (0, 0),
    };
    writer.push_bits(die1, 3);
    writer.push_bits(die2, 3);

    writer.push_bits(board.match_length.unwrap_or(0), 15);
    writer.push_bits(board.score.0, 15);
    writer.push_bits(board.score.1, 15);

    STANDARD_NO_PAD.encode(writer.buf)
}

/// Match-context fields carried by the match ID
struct MatchFields {
    cube_value: u32,
    cube_owner: Option<Player>,
    roller: Player,
    dice: Option<Dice>,
    match_length: Option<u32>,
    score: (u32, u32),
}

fn decode_match_fields(bytes: &[u8]) -> Result<MatchFields> {
    if bytes.len() != MATCH_BYTES {
        return Err(Error::InvalidId(format!(
            "match id must decode to {} bytes, got {}",
            MATCH_BYTES,
            bytes.len()
        )));
    }
    let mut reader = BitReader::new(bytes);

    let cube_exponent = reader.read_bits(4)?;
    let cube_owner = match reader.read_bits(2)? {
        0b00 => Some(Player::One),
        0b01 => Some(Player::Two),
        0b11 => None,
        other => {
            return Err(Error::InvalidId(format!("bad cube owner bits {:#04b}", other)));
        }
    };
    let roller = if reader.read_bit()? { Player::Two } else { Player::One };

    let crawford = reader.read_bit()?;
    let game_state = reader.read_bits(3)?;
    let decision_owner = if reader.read_bit()? { Player::Two } else { Player::One };
    let double_offered = reader.read_bit()?;
    let resignation = reader.read_bits(2)?;
    if crawford || game_state != 0b001 || decision_owner != roller || double_offered || resignation != 0 {
        return Err(Error::InvalidId("unsupported match state bits".to_string()));
    }

    let die1 = reader.read_bits(3)?;
    let die2 = reader.read_bits(3)?;
    if die1 > 6 || die2 > 6 {
        return Err(Error::InvalidId(format!("bad dice fields {} {}", die1, die2)));
    }
    let dice = if (1..=6).contains(&die1) && (1..=6).contains(&die2) {
        Some(Dice::new(die1 as u8, die2 as u8))
    } else {
        None
    };

    let match_length = reader.read_bits(15)?;
    let score1 = reader.read_bits(15)?;
    let score2 = reader.read_bits(15)?;

    Ok(MatchFields {
        cube_value: 1 << cube_exponent,
        cube_owner,
        roller,
        dice,
        match_length: if match_length == 0 { None } else { Some(match_length) },
        score: (score1, score2),
    })
}

/// Decode the position bytes into per-player slot counts. The first unary
/// side belongs to `roller`, established from the match ID beforehand.
fn decode_position_points(bytes: &[u8], roller: Player) -> Result<[[u8; 26]; 2]> {
    if bytes.len() != POSITION_BYTES {
        return Err(Error::InvalidId(format!(
            "position id must decode to {} bytes, got {}",
            POSITION_BYTES,
            bytes.len()
        )));
    }
    let mut reader = BitReader::new(bytes);
    let mut points = [[0u8; 26]; 2];

    for player in [roller, roller.opponent()] {
        let mut on_board = 0u32;
        for slot in (1..=24).chain([BAR]) {
            let mut count = 0u8;
            while reader.read_bit()? {
                count += 1;
                on_board += 1;
                if on_board > CHECKERS as u32 {
                    return Err(Error::InvalidId("more than 15 checkers on one side".to_string()));
                }
            }
            points[player.index()][slot] = count;
        }
        // Checkers not on the board or bar are borne off
        points[player.index()][0] = CHECKERS - on_board as u8;
    }

    if reader.cursor > POSITION_BITS {
        return Err(Error::InvalidId("position bitstream overruns 80 bits".to_string()));
    }
    Ok(points)
}

/// Decode a `positionId:matchId` pair into a full board.
pub fn decode_gnu_id(id: &str) -> Result<Board> {
    let (position_part, match_part) = id
        .split_once(':')
        .ok_or_else(|| Error::InvalidId("expected positionId:matchId".to_string()))?;

    let match_bytes = STANDARD_NO_PAD
        .decode(match_part)
        .map_err(|e| Error::InvalidId(format!("match id base64: {}", e)))?;
    let fields = decode_match_fields(&match_bytes)?;

    let position_bytes = STANDARD_NO_PAD
        .decode(position_part)
        .map_err(|e| Error::InvalidId(format!("position id base64: {}", e)))?;
    let points = decode_position_points(&position_bytes, fields.roller)?;

    Ok(Board {
        points,
        turn: fields.roller,
        dice: fields.dice,
        cube_value: fields.cube_value,
        cube_owner: fields.cube_owner,
        match_length: fields.match_length,
        score: fields.score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_id_is_14_chars_and_match_id_12() {
        let board = Board::starting();
        assert_eq!(board.to_position_id().len(), 14);
        assert_eq!(board.to_match_id().len(), 12);
    }

    #[test]
    fn starting_position_round_trips() {
        let board = Board::starting();
        let id = board.to_gnu_id();
        let decoded = Board::from_gnu_id(&id).unwrap();
        assert_eq!(decoded, board);
        assert_eq!(decoded.to_gnu_id(), id);
    }

    #[test]
    fn match_context_round_trips() {
        let mut board = Board::starting();
        board.turn = Player::Two;
        board.dice = Some(Dice::new(6, 2));
        board.cube_value = 4;
        board.cube_owner = Some(Player::One);
        board.match_length = Some(7);
        board.score = (3, 5);

        let decoded = Board::from_gnu_id(&board.to_gnu_id()).unwrap();
        assert_eq!(decoded, board);
    }

    #[test]
    fn roller_bit_governs_side_assignment() {
        // Identical occupancy, opposite roller: the decoded boards must keep
        // each side's checkers with the right owner.
        let mut board = Board::starting();
        board.points[0][24] -= 1;
        board.points[0][20] += 1;
        board.turn = Player::Two;

        let decoded = Board::from_gnu_id(&board.to_gnu_id()).unwrap();
        assert_eq!(decoded.turn, Player::Two);
        assert_eq!(decoded.points[0][20], 1);
        assert_eq!(decoded.points[1][20], 0);
    }

    #[test]
    fn borne_off_checkers_are_reconstructed() {
        let mut board = Board::starting();
        board.points[0] = [0; 26];
        board.points[0][0] = 10;
        board.points[0][3] = 2;
        board.points[0][2] = 3;

        let decoded = Board::from_gnu_id(&board.to_gnu_id()).unwrap();
        assert_eq!(decoded.points[0][0], 10);
        assert_eq!(decoded.points[0][3], 2);
        assert_eq!(decoded.points[0][2], 3);
    }

    #[test]
    fn encode_decode_is_identity_on_id_strings() {
        let mut board = Board::starting();
        board.dice = Some(Dice::new(3, 1));
        board.match_length = Some(5);
        let id = board.to_gnu_id();
        let reencoded = Board::from_gnu_id(&id).unwrap().to_gnu_id();
        assert_eq!(reencoded, id);
    }

    #[test]
    fn malformed_ids_are_rejected() {
        assert!(Board::from_gnu_id("no-colon-here").is_err());
        assert!(Board::from_gnu_id("AAAA:AAAA").is_err());
        assert!(Board::from_gnu_id(":").is_err());
    }

    #[test]
    fn money_game_has_zero_length_field() {
        let board = Board::starting();
        let decoded = Board::from_gnu_id(&board.to_gnu_id()).unwrap();
        assert_eq!(decoded.match_length, None);
    }
}
